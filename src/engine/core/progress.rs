use super::types::ProgressEvent;

/// Parser for ffmpeg's human-readable stderr log.
///
/// The total duration comes from the first `Duration:` line of the input
/// banner; positions and speed come from the `time=` / `speed=` status lines.
#[derive(Debug, Default, Clone)]
pub struct ProgressParser {
    pub duration_s: Option<f64>,
    pub position_s: f64,
    pub speed: Option<f64>,
    last_fraction: f64,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one output line, returning an event when the position advanced
    pub fn parse_line(&mut self, line: &str) -> Option<ProgressEvent> {
        if self.duration_s.is_none() {
            if let Some(rest) = value_after(line, "Duration:") {
                self.duration_s = parse_timestamp(rest).filter(|d| *d > 0.0);
            }
            return None;
        }

        let position = value_after(line, "time=").and_then(parse_timestamp)?;
        self.position_s = position;
        if let Some(speed) = value_after(line, "speed=").and_then(parse_speed) {
            self.speed = Some(speed);
        }

        let fraction = self.fraction()?.max(self.last_fraction);
        self.last_fraction = fraction;
        Some(ProgressEvent::new(fraction, self.status_message(fraction)))
    }

    /// `min(position / duration, 1.0)` once the duration is known
    pub fn fraction(&self) -> Option<f64> {
        let duration = self.duration_s?;
        Some((self.position_s / duration).clamp(0.0, 1.0))
    }

    fn status_message(&self, fraction: f64) -> String {
        let pct = fraction * 100.0;
        match self.speed {
            Some(speed) => format!("Processing... {:.0}% @ {:.2}x", pct, speed),
            None => format!("Processing... {:.0}%", pct),
        }
    }
}

/// Value following `key`, up to the next whitespace or comma
fn value_after<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let start = line.find(key)? + key.len();
    let rest = line[start..].trim_start();
    let end = rest
        .find(|c: char| c.is_whitespace() || c == ',')
        .unwrap_or(rest.len());
    let value = &rest[..end];
    (!value.is_empty()).then_some(value)
}

/// Parse `HH:MM:SS.xx` into seconds; `N/A` and negative stamps yield None
pub fn parse_timestamp(value: &str) -> Option<f64> {
    if value.starts_with('-') {
        return None;
    }
    let mut parts = value.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

fn parse_speed(value: &str) -> Option<f64> {
    value.trim_end_matches('x').parse::<f64>().ok()
}
