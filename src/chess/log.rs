use std::io::Write;

/// Environment variable holding an `env_logger` filter, e.g. `CHESS_LOG=debug`.
pub const LOG_ENV: &str = "CHESS_LOG";

/// Installs the process-wide logger. `CHESS_LOG` wins over `default_level`.
pub fn init(default_level: &str) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().filter_or(LOG_ENV, default_level));

    builder
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .write_style(env_logger::WriteStyle::Never)
        .target(env_logger::Target::Stderr);

    // A second call (e.g. from tests) keeps the first logger.
    let _ = builder.try_init();
}
