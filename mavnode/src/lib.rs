/*! # Mavnode

A transport-agnostic [MAVLink](https://mavlink.io/en/) 1.0 / 2.0
communication library.

A [`Node`](node::Node) attaches to any number of transports — serial ports,
TCP and UDP in server, client, and broadcast modes, or caller-supplied byte
streams — decodes and encodes frames according to a user-declared dialect,
and surfaces frames, channel lifecycle changes, and parse errors as events.
Stateful protocol features are handled by the node itself: sequencing,
automatic heartbeats, `MAVLink 2` message signing with replay protection,
and ArduPilot stream requests.

# Usage

```rust,no_run
use mavnode::prelude::*;

fn main() -> mavnode::error::Result<()> {
    // A MAVLink 2 node with the built-in minimal dialect.
    let node = Node::new(
        NodeConf::new(Dialect::minimal(), 11, 1)
            .endpoint(TcpServer::new("127.0.0.1:5600")?),
    )?;

    for event in node.events() {
        match event {
            Event::Frame(frame, channel) => {
                // Forward everything else to the other peers: this node is
                // now a router.
                node.write_frame_except(&channel, &frame)?;
            }
            Event::ChannelOpen(channel) => println!("{channel} up"),
            Event::ChannelClose(channel) => println!("{channel} down"),
            _ => {}
        }
    }
    Ok(())
}
```

# Dialects

Dialects are declared in pure Rust with the derive macros from
[`protocol::derive`]; the message layout (field sort order, payload sizes,
CRC-extra) is computed at dialect construction. See
[`protocol::minimal`] for a complete example and [`test_utils`] for
declarations covering arrays, strings, enums, and extension fields.

# Message signing

Set an outgoing key to sign emitted frames and an incoming key to require
and verify signatures on received frames; replayed frames are rejected via
the per-link monotonic timestamp rule.
*/

// Lets the derive-generated `::mavnode::...` paths resolve inside this
// crate.
extern crate self as mavnode;

pub mod consts;
pub mod error;
pub mod io;
pub mod node;
pub mod prelude;
pub mod protocol;
pub mod test_utils;
pub mod utils;
