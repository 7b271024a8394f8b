use std::{env, str::FromStr, sync::Once};

use log::LevelFilter;
use log4rs::{
    append::console::{ConsoleAppender, Target},
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    Config,
};

static INIT: Once = Once::new();

/// Console logging for integration tests. The level comes from `RUST_LOG`
/// (a plain level name such as `debug`) and defaults to `info`. Safe to
/// call from every test of a binary.
pub fn init_default_logging() {
    INIT.call_once(|| {
        let level = env::var("RUST_LOG")
            .ok()
            .and_then(|value| LevelFilter::from_str(&value).ok())
            .unwrap_or(LevelFilter::Info);

        let stderr = ConsoleAppender::builder()
            .target(Target::Stderr)
            .encoder(Box::new(PatternEncoder::new(
                "{d(%H:%M:%S%.3f)} {h({l:<5})} {t} - {m}{n}",
            )))
            .build();

        let config = Config::builder()
            .appender(Appender::builder().build("stderr", Box::new(stderr)))
            .build(Root::builder().appender("stderr").build(level))
            .expect("valid logging config");

        // Another harness may have installed a logger already.
        let _ = log4rs::init_config(config);
    });
}
