//! Caller-supplied transports.

use std::fmt::{Debug, Formatter};
use std::io::{Read, Write};
use std::sync::Mutex;

use crate::error::{ConfigError, Result};
use crate::io::channel::ChannelInfo;
use crate::io::endpoint::{EndpointConf, EndpointContext};

type BoxedReader = Box<dyn Read + Send>;
type BoxedWriter = Box<dyn Write + Send>;

/// Endpoint over a caller-supplied duplex byte stream, split into its `Read`
/// and `Write` halves.
///
/// The channel lives until either half reports an error or EOF; there is no
/// reconnection.
///
/// # Usage
///
/// ```rust,no_run
/// use std::sync::mpsc;
///
/// use mavnode::io::CustomEndpoint;
/// use mavnode::utils::{MpscReader, MpscWriter};
///
/// let (in_tx, in_rx) = mpsc::channel();
/// let (out_tx, out_rx) = mpsc::channel();
///
/// let endpoint = CustomEndpoint::new(
///     "loopback",
///     MpscReader::new(in_rx),
///     MpscWriter::new(out_tx),
/// );
/// # _ = (in_tx, out_rx, endpoint);
/// ```
pub struct CustomEndpoint {
    name: String,
    halves: Mutex<Option<(BoxedReader, BoxedWriter)>>,
}

impl CustomEndpoint {
    /// Creates an endpoint over the given transport halves.
    pub fn new<R, W>(name: &str, reader: R, writer: W) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        Self {
            name: name.to_string(),
            halves: Mutex::new(Some((Box::new(reader), Box::new(writer)))),
        }
    }
}

impl Debug for CustomEndpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomEndpoint")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl EndpointConf for CustomEndpoint {
    fn start(&self, ctx: EndpointContext) -> Result<()> {
        let Some((reader, writer)) = self.halves.lock().unwrap().take() else {
            // A node consumes the halves; the same endpoint value cannot
            // attach twice.
            return Err(ConfigError::EndpointAlreadyStarted.into());
        };

        ctx.open_channel(
            ChannelInfo::Custom {
                name: self.name.clone(),
            },
            reader,
            writer,
        );

        Ok(())
    }
}
