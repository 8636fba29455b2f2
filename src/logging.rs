// Logger setup shared by the binaries
use env_logger::{Builder, Env};
use std::io::Write;

/// Initialise `env_logger` with an `info` default, overridable via `RUST_LOG`.
///
/// `raw_terminal` ends lines with `\r\n` so output stays aligned while the
/// terminal is in raw mode. Calling this twice is harmless.
pub fn init(raw_terminal: bool) {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    if raw_terminal {
        builder.format(|buf, record| {
            write!(buf, "[{} {}] {}\r\n", record.level(), record.target(), record.args())
        });
    }
    let _ = builder.try_init();
}
