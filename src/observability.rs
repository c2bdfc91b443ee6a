use std::net::SocketAddr;

// ── Booking funnel ──────────────────────────────────────────────

/// Counter: date picks and confirmations validated. Labels: outcome (`ok` or a rejection code).
pub const VALIDATIONS_TOTAL: &str = "rentspan_validations_total";

/// Histogram: days an end date was shifted by repair.
pub const REPAIR_SHIFT_DAYS: &str = "rentspan_repair_shift_days";

/// Counter: bookings accepted by the store.
pub const BOOKINGS_TOTAL: &str = "rentspan_bookings_total";

/// Counter: bookings the store refused because of an overlapping booking.
pub const BOOKING_CONFLICTS_TOTAL: &str = "rentspan_booking_conflicts_total";

// ── Collaborators / engine cost ─────────────────────────────────

/// Counter: reservation snapshot fetches that failed.
pub const FETCH_FAILURES_TOTAL: &str = "rentspan_fetch_failures_total";

/// Histogram: blocked date set construction time in seconds.
pub const BLOCKED_SET_BUILD_SECONDS: &str = "rentspan_blocked_set_build_seconds";

/// Counter: booking sessions opened through the service.
pub const SESSIONS_OPENED_TOTAL: &str = "rentspan_sessions_opened_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_without_port_is_noop() {
        assert!(init(None).is_ok());
    }

    #[test]
    fn metric_names_share_prefix() {
        for name in [
            VALIDATIONS_TOTAL,
            REPAIR_SHIFT_DAYS,
            BOOKINGS_TOTAL,
            BOOKING_CONFLICTS_TOTAL,
            FETCH_FAILURES_TOTAL,
            BLOCKED_SET_BUILD_SECONDS,
            SESSIONS_OPENED_TOTAL,
        ] {
            assert!(name.starts_with("rentspan_"), "{name}");
        }
    }
}
