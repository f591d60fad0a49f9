/*!
mrt2bmp replays archived BGP routing data toward a BMP collector.

It impersonates a router from the perspective of an OpenBMP collector: it
opens a TCP session, introduces itself with a BMP Initiation message,
announces the peers found in an MRT RIB dump, replays the full table as
Route-Monitoring messages, and then follows the per-interval UPDATE archives
in chronological order, forever. Downstream analytics see a live monitoring
feed; the timestamps are the archive's, not the wall clock's.

The crate is organized along the data path:

- [`sync`] discovers and stages archive files (RouteViews, RIPE RIS, or a
  local directory),
- [`parser`] decodes MRT records lazily,
- [`replay`] turns records into BMP messages in protocol order,
- [`bmp`] builds the wire messages,
- [`writer`] owns the collector connection,
- [`supervisor`] ties the workers together and handles shutdown.
*/

pub mod bmp;
pub mod config;
pub mod error;
pub mod models;
pub mod parser;
pub mod replay;
pub mod supervisor;
pub mod sync;
pub mod writer;

pub use config::Config;
pub use error::{ConfigError, MrtError, ReplayError, SyncError};
