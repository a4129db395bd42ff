//! Thin convenience layer over the [`log`] facade.
//!
//! This core ships no logger implementation of its own — the host process
//! (the base-station control program) installs whichever `log::Log` sink it
//! wants (`env_logger`, a syslog bridge, ...). What lives here is just the
//! per-layer target naming so a subscriber can filter by subsystem.

/// Target string for the RRC connection state machine.
pub const TARGET_RRC: &str = "umts::rrc";
/// Target string for RLC entities (TM/UM/AM).
pub const TARGET_RLC: &str = "umts::rlc";
/// Target string for the MAC multiplexer/scheduler.
pub const TARGET_MAC: &str = "umts::mac";
/// Target string for integrity protection.
pub const TARGET_INTEGRITY: &str = "umts::integrity";

#[cfg(test)]
pub fn init_test_logger() {
    use std::sync::Once;
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        let _ = test_logger::try_init();
    });
}

#[cfg(test)]
mod test_logger {
    //! A deliberately tiny stand-in so `#[test] -- --nocapture` shows
    //! `log::debug!`/`log::warn!` output. Not exported.
    use log::{Level, Log, Metadata, Record};

    struct StderrLogger;

    impl Log for StderrLogger {
        fn enabled(&self, metadata: &Metadata<'_>) -> bool {
            metadata.level() <= Level::Debug
        }

        fn log(&self, record: &Record<'_>) {
            if self.enabled(record.metadata()) {
                eprintln!("[{}] {}: {}", record.level(), record.target(), record.args());
            }
        }

        fn flush(&self) {}
    }

    static LOGGER: StderrLogger = StderrLogger;

    pub fn try_init() -> Result<(), log::SetLoggerError> {
        log::set_logger(&LOGGER).map(|()| log::set_max_level(log::LevelFilter::Debug))
    }
}
