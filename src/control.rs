use crate::{
    config::MqttConfig,
    scheduler::{ConnectionFlag, Event},
};
use rumqttc::{Client, Connection, Event as MqttEvent, MqttOptions, Packet, QoS};
use std::{
    sync::mpsc::Sender,
    thread,
    time::Duration,
};

const RETRY_DELAY: Duration = Duration::from_secs(1);
const KEEP_ALIVE: Duration = Duration::from_secs(5);

/// The topic layout under a common prefix: commands arrive on
/// `<prefix>/in/<command>`, status goes out on `<prefix>/out`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    prefix: String,
}

impl Topics {
    pub fn new(prefix: &str) -> Topics {
        Topics {
            prefix: prefix.trim_end_matches('/').to_owned(),
        }
    }

    pub fn subscription(&self) -> String {
        format!("{}/in/#", self.prefix)
    }

    pub fn status(&self) -> String {
        format!("{}/out", self.prefix)
    }

    /// The command a topic carries: its last segment, provided the topic is
    /// one of ours.
    pub fn command_name<'t>(&self, topic: &'t str) -> Option<&'t str> {
        let rest = topic.strip_prefix(&self.prefix)?.strip_prefix("/in/")?;
        rest.rsplit('/').next().filter(|name| !name.is_empty())
    }
}

/// Delivers commands from the MQTT broker into the event loop and keeps the
/// shared connection flag current.
pub struct ControlChannel {
    client: Client,
    topics: Topics,
    connected: ConnectionFlag,
}

impl ControlChannel {
    pub fn connect(config: &MqttConfig, events: Sender<Event>) -> ControlChannel {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(KEEP_ALIVE);
        if let Some(username) = &config.username {
            options.set_credentials(username, config.password.as_deref().unwrap_or_default());
        }

        let (client, connection) = Client::new(options, 10);
        let topics = Topics::new(&config.topic_prefix);
        let connected = ConnectionFlag::default();

        {
            let client = client.clone();
            let topics = topics.clone();
            let connected = connected.clone();
            // Detached: ends by itself once the client disconnects or the event loop is gone
            thread::spawn(move || Self::run_loop(connection, client, topics, connected, events));
        }

        log::info!("connecting to mqtt://{}:{}", config.host, config.port);
        ControlChannel {
            client,
            topics,
            connected,
        }
    }

    pub fn connection(&self) -> ConnectionFlag {
        self.connected.clone()
    }

    pub fn publish_status(&self, status: &str) {
        if let Err(err) = self
            .client
            .try_publish(self.topics.status(), QoS::AtLeastOnce, false, status)
        {
            log::error!("could not publish status {status:?}: {err}");
        }
    }

    pub fn disconnect(&self) {
        if let Err(err) = self.client.try_disconnect() {
            log::warn!("could not disconnect cleanly: {err}");
        }
    }

    fn run_loop(
        mut connection: Connection,
        client: Client,
        topics: Topics,
        connected: ConnectionFlag,
        events: Sender<Event>,
    ) {
        for notification in connection.iter() {
            match notification {
                Ok(MqttEvent::Incoming(Packet::ConnAck(_))) => {
                    log::info!("connected to broker");
                    connected.set(true);
                    // Clean sessions forget subscriptions, so renew on every connect
                    if let Err(err) = client.try_subscribe(topics.subscription(), QoS::AtMostOnce)
                    {
                        log::error!("could not subscribe: {err}");
                    }
                }
                Ok(MqttEvent::Incoming(Packet::Publish(publish))) => {
                    let Some(name) = topics.command_name(&publish.topic) else {
                        continue;
                    };
                    let payload = String::from_utf8_lossy(&publish.payload).into_owned();
                    let event = Event::Command {
                        name: name.to_owned(),
                        payload,
                    };
                    if events.send(event).is_err() {
                        log::debug!("event loop gone, leaving the mqtt loop");
                        break;
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    connected.set(false);
                    log::error!("MQTT {err}");
                    thread::sleep(RETRY_DELAY);
                }
            }
        }
        connected.set(false);
    }
}
