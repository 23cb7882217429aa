/// Number of target humidity steps the device divides 0-100% into.
pub const HUMIDITY_STEPS: u8 = 10;

/// Scale a percentage onto the inclusive range `low..=high`.
pub fn percentage_to_ranged_value(low: f64, high: f64, percentage: f64) -> f64 {
    (high - low + 1.0) * percentage / 100.0
}

/// Translate a requested humidity to the first device step at or above it.
///
/// Returns `None` outside `(0, 100]`; no command should be sent in that case.
pub fn translate_humidity(humidity: f64, steps: u8) -> Option<u8> {
    if !(humidity > 0.0 && humidity <= 100.0) || steps == 0 {
        return None;
    }

    let steps = f64::from(steps);
    let step = percentage_to_ranged_value(1.0, steps, humidity).ceil();
    Some((step * 100.0 / steps) as u8)
}
