use crate::types::ClickEvent;

/// Maximum distance (seconds) between a beat and a downbeat for an accent.
pub const ACCENT_TOLERANCE: f64 = 0.01;

/// One click per beat, in input order, accented when any downbeat lies within
/// [`ACCENT_TOLERANCE`].
pub fn generate_clicks(beats: &[f64], downbeats: &[f64]) -> Vec<ClickEvent> {
    beats
        .iter()
        .map(|&time| ClickEvent {
            time,
            accent: downbeats
                .iter()
                .any(|d| (time - d).abs() < ACCENT_TOLERANCE),
        })
        .collect()
}
