//! Serial transport.

use std::thread;

use crate::consts::{RECONNECT_INTERVAL, SLEEP_POOLING_INTERVAL, TRANSPORT_READ_TIMEOUT};
use crate::error::Result;
use crate::io::channel::ChannelInfo;
use crate::io::endpoint::{EndpointConf, EndpointContext};
use crate::utils::sleep_while_open;

/// Serial port endpoint: a single channel over a device, reopened with a
/// backoff on disconnect.
#[derive(Clone, Debug)]
pub struct SerialPort {
    path: String,
    baud_rate: u32,
}

impl SerialPort {
    /// Creates a serial endpoint over the given device path and baud rate.
    pub fn new(path: &str, baud_rate: u32) -> Self {
        Self {
            path: path.to_string(),
            baud_rate,
        }
    }

    fn open(&self) -> Result<Box<dyn serialport::SerialPort>> {
        let port = serialport::new(&self.path, self.baud_rate)
            .timeout(TRANSPORT_READ_TIMEOUT)
            .open()?;
        Ok(port)
    }
}

impl EndpointConf for SerialPort {
    fn start(&self, ctx: EndpointContext) -> Result<()> {
        // The first open happens eagerly: a missing or busy device fails
        // `Node::new`.
        let first = self.open()?;

        let conf = self.clone();
        let state = ctx.state();

        thread::spawn(move || {
            let mut transport = Some(first);
            while !state.is_closed() {
                let port = match transport.take() {
                    Some(port) => Ok(port),
                    None => conf.open(),
                };

                match port.and_then(|writer| {
                    let reader = writer.try_clone()?;
                    Ok(ctx.open_channel(
                        ChannelInfo::Serial {
                            path: conf.path.clone(),
                            baud_rate: conf.baud_rate,
                        },
                        reader,
                        writer,
                    ))
                }) {
                    Ok((_, channel_state)) => {
                        while !channel_state.is_closed() && !state.is_closed() {
                            thread::sleep(SLEEP_POOLING_INTERVAL);
                        }
                    }
                    Err(err) => {
                        log::trace!("[serial:{}] open error: {err}", conf.path)
                    }
                }

                sleep_while_open(&state, RECONNECT_INTERVAL);
            }
        });

        Ok(())
    }
}
