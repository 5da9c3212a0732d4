use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sermux_transport::Port;
use tracing::info;

use crate::error::{MuxError, Result};

/// One virtual port bound to a channel.
///
/// The engine only borrows the endpoint's port for individual reads and
/// writes; whoever built the endpoint decides what backs it.
pub struct Endpoint {
    channel: u8,
    name: String,
    alias: Option<PathBuf>,
    port: Box<dyn Port>,
}

impl Endpoint {
    pub fn new(channel: u8, name: impl Into<String>, port: impl Port + 'static) -> Self {
        Self {
            channel,
            name: name.into(),
            alias: None,
            port: Box::new(port),
        }
    }

    /// Record the path external consumers use to reach this endpoint.
    pub fn with_alias(mut self, alias: impl Into<PathBuf>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Name assigned by whoever created the endpoint (e.g. `/dev/pts/3`).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alias(&self) -> Option<&Path> {
        self.alias.as_deref()
    }
}

impl Port for Endpoint {
    fn read_bytes(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port.read_bytes(buf)
    }

    fn write_bytes(&self, buf: &[u8]) -> std::io::Result<usize> {
        self.port.write_bytes(buf)
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("channel", &self.channel)
            .field("name", &self.name)
            .field("alias", &self.alias)
            .finish()
    }
}

/// Channel ID to endpoint mapping.
///
/// Filled once at startup and never changed while the engine runs, so both
/// directions read it without locking. Iteration follows registration
/// order, which is also the egress polling order.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    endpoints: Vec<Endpoint>,
    index: HashMap<u8, usize>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an endpoint under its channel ID.
    pub fn register(&mut self, endpoint: Endpoint) -> Result<()> {
        let channel = endpoint.channel();
        if self.index.contains_key(&channel) {
            return Err(MuxError::DuplicateChannel(channel));
        }
        self.index.insert(channel, self.endpoints.len());
        self.endpoints.push(endpoint);
        Ok(())
    }

    /// Endpoint registered for `channel`, if any.
    pub fn lookup(&self, channel: u8) -> Option<&Endpoint> {
        self.index.get(&channel).map(|&slot| &self.endpoints[slot])
    }

    /// Endpoints in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    /// Channel IDs in registration order.
    pub fn channels(&self) -> Vec<u8> {
        self.endpoints.iter().map(Endpoint::channel).collect()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Fail if there is nothing to multiplex.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(MuxError::NoChannels);
        }
        Ok(())
    }

    /// Release every endpoint, in registration order.
    pub fn close(self) {
        for endpoint in self.endpoints {
            info!(
                channel = endpoint.channel,
                name = %endpoint.name,
                alias = ?endpoint.alias,
                "disconnecting"
            );
            drop(endpoint);
        }
    }
}

impl<'a> IntoIterator for &'a ChannelRegistry {
    type Item = &'a Endpoint;
    type IntoIter = std::slice::Iter<'a, Endpoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.endpoints.iter()
    }
}
