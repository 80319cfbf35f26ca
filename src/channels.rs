use crate::prelude::*;

#[derive(Debug, Clone)]
pub struct Channels {
    pub from_device: broadcast::Sender<ecoflow::cloud::ChannelData>,
    pub to_device: broadcast::Sender<ecoflow::cloud::ChannelData>,
    pub to_mqtt: broadcast::Sender<mqtt::ChannelData>,
}

impl Default for Channels {
    fn default() -> Self {
        Self::new()
    }
}

impl Channels {
    pub fn new() -> Self {
        Self {
            from_device: Self::channel(),
            to_device: Self::channel(),
            to_mqtt: Self::channel(),
        }
    }

    fn channel<T: Clone>() -> broadcast::Sender<T> {
        broadcast::channel(2048).0
    }
}
