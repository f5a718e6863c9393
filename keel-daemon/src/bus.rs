//! In-process message bus.
//!
//! Plugins subscribe to [`Topic`]s. Every published [`Message`] is cloned
//! into the queue of each plugin subscribed to its topic. Each plugin drains
//! its own queue on its own task, so a plugin never sees two messages at
//! once while different plugins run concurrently.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use keel_core::{ConfigApplyOutcome, ConfigApplyRequest};

use crate::error::DaemonError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    ConfigApplyRequest,
    ConfigApplyComplete,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::ConfigApplyRequest => "instance-config-update-request",
            Topic::ConfigApplyComplete => "instance-config-update-complete",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    ConfigApplyRequest(ConfigApplyRequest),
    ConfigApplyComplete(ConfigApplyOutcome),
}

impl Message {
    pub fn topic(&self) -> Topic {
        match self {
            Message::ConfigApplyRequest(_) => Topic::ConfigApplyRequest,
            Message::ConfigApplyComplete(_) => Topic::ConfigApplyComplete,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInfo {
    pub name: &'static str,
}

#[async_trait]
pub trait Plugin: Send {
    fn info(&self) -> PluginInfo;

    fn subscriptions(&self) -> Vec<Topic>;

    /// Called once before the first message. `bus` is the plugin's way to
    /// publish.
    async fn init(&mut self, bus: BusHandle) -> Result<(), DaemonError>;

    async fn process(&mut self, message: Message);

    async fn close(&mut self) -> Result<(), DaemonError>;
}

type Routes = HashMap<Topic, Vec<mpsc::UnboundedSender<Message>>>;

/// Cheap, cloneable publish/subscribe handle.
#[derive(Clone, Default)]
pub struct BusHandle {
    routes: Arc<RwLock<Routes>>,
}

impl BusHandle {
    /// Deliver `message` to every current subscriber of its topic. Returns
    /// how many queues accepted it. Queues whose receiver is gone are
    /// dropped from the route.
    pub fn publish(&self, message: Message) -> usize {
        let topic = message.topic();
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        let Some(subscribers) = routes.get_mut(&topic) else {
            tracing::debug!(%topic, "no subscribers");
            return 0;
        };
        subscribers.retain(|tx| !tx.is_closed());
        subscribers
            .iter()
            .filter(|tx| tx.send(message.clone()).is_ok())
            .count()
    }

    /// Open a queue receiving every message published on `topics`.
    pub fn subscribe(&self, topics: &[Topic]) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        for topic in topics {
            let subscribers = routes.entry(*topic).or_default();
            subscribers.retain(|tx| !tx.is_closed());
            subscribers.push(tx.clone());
        }
        rx
    }

    #[cfg(test)]
    fn subscriber_count(&self, topic: Topic) -> usize {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        routes.get(&topic).map_or(0, Vec::len)
    }
}

/// Owns the registered plugins and runs one task per plugin.
#[derive(Default)]
pub struct MessagePipe {
    bus: BusHandle,
    plugins: Vec<Box<dyn Plugin>>,
}

impl MessagePipe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bus(&self) -> BusHandle {
        self.bus.clone()
    }

    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        tracing::debug!(plugin = plugin.info().name, "registered plugin");
        self.plugins.push(plugin);
    }

    /// Subscribe and initialise every plugin, then process messages until
    /// `shutdown` fires. Each plugin is closed after its loop ends.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), DaemonError> {
        self.start(shutdown).await?.wait().await
    }

    /// Subscribe and initialise every plugin and spawn their tasks. Messages
    /// published after this returns reach every plugin.
    pub async fn start(self, shutdown: CancellationToken) -> Result<RunningPipe, DaemonError> {
        let mut tasks = JoinSet::new();

        for mut plugin in self.plugins {
            let name = plugin.info().name;
            let mut queue = self.bus.subscribe(&plugin.subscriptions());
            plugin.init(self.bus.clone()).await?;
            tracing::info!(plugin = name, "plugin initialised");

            let shutdown = shutdown.clone();
            tasks.spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        message = queue.recv() => match message {
                            Some(message) => plugin.process(message).await,
                            None => break,
                        },
                    }
                }
                if let Err(err) = plugin.close().await {
                    tracing::warn!(plugin = name, error = %err, "plugin close failed");
                }
            });
        }

        Ok(RunningPipe { tasks })
    }
}

/// Plugin tasks spawned by [`MessagePipe::start`].
pub struct RunningPipe {
    tasks: JoinSet<()>,
}

impl RunningPipe {
    /// Wait for every plugin task to finish.
    pub async fn wait(mut self) -> Result<(), DaemonError> {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(err) = joined {
                return Err(DaemonError::Runtime(format!("plugin task join failure: {err}")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use chrono::Utc;
    use keel_core::InstanceId;

    fn request(id: &str) -> Message {
        Message::ConfigApplyRequest(ConfigApplyRequest {
            correlation_id: id.to_string(),
            overview: None,
        })
    }

    fn complete(id: &str) -> Message {
        Message::ConfigApplyComplete(ConfigApplyOutcome {
            correlation_id: id.to_string(),
            instance_id: InstanceId::from("nginx-1"),
            version: String::new(),
            success: true,
            error: None,
            completed_at: Utc::now(),
        })
    }

    /// Records what it sees; holds each message for `hold` to expose overlap.
    struct Recorder {
        seen: Arc<Mutex<Vec<String>>>,
        in_flight: Arc<Mutex<usize>>,
        max_in_flight: Arc<Mutex<usize>>,
        hold: Duration,
        closed: Arc<Mutex<bool>>,
    }

    impl Recorder {
        fn new(hold: Duration) -> Self {
            Self {
                seen: Arc::default(),
                in_flight: Arc::default(),
                max_in_flight: Arc::default(),
                hold,
                closed: Arc::default(),
            }
        }
    }

    #[async_trait]
    impl Plugin for Recorder {
        fn info(&self) -> PluginInfo {
            PluginInfo { name: "recorder" }
        }

        fn subscriptions(&self) -> Vec<Topic> {
            vec![Topic::ConfigApplyRequest]
        }

        async fn init(&mut self, _bus: BusHandle) -> Result<(), DaemonError> {
            Ok(())
        }

        async fn process(&mut self, message: Message) {
            {
                let mut n = self.in_flight.lock().unwrap();
                *n += 1;
                let mut max = self.max_in_flight.lock().unwrap();
                *max = (*max).max(*n);
            }
            tokio::time::sleep(self.hold).await;
            if let Message::ConfigApplyRequest(req) = message {
                self.seen.lock().unwrap().push(req.correlation_id);
            }
            *self.in_flight.lock().unwrap() -= 1;
        }

        async fn close(&mut self) -> Result<(), DaemonError> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }

    #[test]
    fn topics_have_wire_names() {
        assert_eq!(
            Topic::ConfigApplyRequest.to_string(),
            "instance-config-update-request"
        );
        assert_eq!(request("c").topic(), Topic::ConfigApplyRequest);
        assert_eq!(complete("c").topic(), Topic::ConfigApplyComplete);
    }

    #[tokio::test]
    async fn publish_reaches_only_subscribers_of_topic() {
        let bus = BusHandle::default();
        let mut requests = bus.subscribe(&[Topic::ConfigApplyRequest]);
        let mut completions = bus.subscribe(&[Topic::ConfigApplyComplete]);

        assert_eq!(bus.publish(request("r-1")), 1);
        assert_eq!(requests.recv().await, Some(request("r-1")));
        assert!(completions.try_recv().is_err());
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = BusHandle::default();
        let kept = bus.subscribe(&[Topic::ConfigApplyRequest]);
        drop(bus.subscribe(&[Topic::ConfigApplyRequest]));
        assert_eq!(bus.subscriber_count(Topic::ConfigApplyRequest), 2);

        assert_eq!(bus.publish(request("r-1")), 1);
        assert_eq!(bus.subscriber_count(Topic::ConfigApplyRequest), 1);

        drop(kept);
        drop(bus.subscribe(&[Topic::ConfigApplyRequest]));
        assert_eq!(bus.subscriber_count(Topic::ConfigApplyRequest), 1);
    }

    #[test]
    fn publish_without_subscribers_delivers_nowhere() {
        assert_eq!(BusHandle::default().publish(request("r-1")), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn plugin_processes_messages_one_at_a_time_in_order() {
        let recorder = Recorder::new(Duration::from_millis(50));
        let seen = recorder.seen.clone();
        let max_in_flight = recorder.max_in_flight.clone();
        let closed = recorder.closed.clone();

        let mut pipe = MessagePipe::new();
        let bus = pipe.bus();
        pipe.register(Box::new(recorder));

        let shutdown = CancellationToken::new();
        let running = pipe.start(shutdown.clone()).await.expect("start");

        for id in ["a", "b", "c"] {
            assert_eq!(bus.publish(request(id)), 1);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        shutdown.cancel();
        running.wait().await.expect("pipe");

        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(*max_in_flight.lock().unwrap(), 1);
        assert!(*closed.lock().unwrap());
    }
}
