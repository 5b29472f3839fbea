// Logger setup
// env_logger backend for the `log` facade, text or JSON lines
use std::io::Write;
use std::sync::Once;

use chrono::{SecondsFormat, Utc};

use crate::config::LogFormat;

static INIT: Once = Once::new();

/// Install the global logger. Later calls are no-ops.
///
/// The filter defaults to `info` and follows `RUST_LOG` when set.
pub fn init(format: LogFormat) {
    INIT.call_once(|| {
        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

        builder.format(move |buf, record| {
            let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
            match format {
                LogFormat::Json => {
                    let line = serde_json::json!({
                        "ts": ts,
                        "level": record.level().to_string(),
                        "target": record.target(),
                        "msg": record.args().to_string(),
                    });
                    writeln!(buf, "{}", line)
                }
                LogFormat::Text => writeln!(
                    buf,
                    "{} {} {} {}",
                    ts,
                    record.level(),
                    record.target(),
                    record.args()
                ),
            }
        });

        if let Err(e) = builder.try_init() {
            eprintln!("audiograb: logger already installed: {}", e);
        }
    });
}
