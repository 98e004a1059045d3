//! [crates/telemetry/src/lib.rs]
//! =================================================================
//! APARATO: OBSERVABILITY BOOTSTRAP (ESTRATO L4/L6)
//! RESPONSABILIDAD: INICIALIZACION DE TRAZADO Y CAPTURA DE PANICOS
//!
//! Dual-mode subscriber: human-readable compact output under
//! `debug_assertions`, flattened JSON otherwise. The panic hook logs
//! through `tracing` before the default unwind behavior runs.
//! =================================================================

use std::panic;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global `tracing` subscriber and panic hook for a
/// binary embedding the AltMount import core. Safe to call once per
/// process; panics if a global subscriber is already installed.
pub fn init_tracing(service_name: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if cfg!(debug_assertions) { "debug" } else { "info" };
        format!("{service_name}={level},libsql=warn").into()
    });

    if cfg!(debug_assertions) {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_target(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().flatten_event(true))
            .init();
    }

    let service = service_name.to_string();
    panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| info.payload().downcast_ref::<String>().map(String::as_str))
            .unwrap_or("<non-string panic payload>");

        tracing::error!(
            target: "panic_monitor",
            service = %service,
            location = %location,
            "thread panicked: {payload}"
        );
    }));

    tracing::info!("[TELEMETRY]: tracing initialized for '{service_name}'");
}
