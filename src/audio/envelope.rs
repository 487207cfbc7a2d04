//! Gain automation anchored to audio-context time.
//!
//! Mirrors `setValueAtTime` / `linearRampToValueAtTime`: a ramp runs from the
//! previous event's time and value to the new target, and the value holds
//! after the last event.

#[derive(Debug, Clone, Copy, PartialEq)]
struct GainEvent {
    time: f64,
    value: f32,
    ramp: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GainEnvelope {
    initial: f32,
    events: Vec<GainEvent>,
}

impl GainEnvelope {
    /// Constant gain until events are added
    pub fn constant(value: f32) -> Self {
        Self {
            initial: value,
            events: Vec::new(),
        }
    }

    /// Jump to `value` at `time`
    pub fn set_value_at(&mut self, value: f32, time: f64) -> &mut Self {
        self.insert(GainEvent {
            time,
            value,
            ramp: false,
        });
        self
    }

    /// Ramp linearly from the previous event to `value`, arriving at `time`
    pub fn linear_ramp_to(&mut self, value: f32, time: f64) -> &mut Self {
        self.insert(GainEvent {
            time,
            value,
            ramp: true,
        });
        self
    }

    fn insert(&mut self, event: GainEvent) {
        let index = self.events.partition_point(|e| e.time <= event.time);
        self.events.insert(index, event);
    }

    pub fn value_at(&self, time: f64) -> f32 {
        let mut prev_time = f64::NEG_INFINITY;
        let mut prev_value = self.initial;

        for event in &self.events {
            if time < event.time {
                if event.ramp && prev_time.is_finite() && event.time > prev_time {
                    let progress = ((time - prev_time) / (event.time - prev_time)) as f32;
                    return prev_value + (event.value - prev_value) * progress;
                }
                return prev_value;
            }
            prev_time = event.time;
            prev_value = event.value;
        }
        prev_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant() {
        let env = GainEnvelope::constant(0.8);
        assert_eq!(env.value_at(-5.0), 0.8);
        assert_eq!(env.value_at(100.0), 0.8);
    }

    #[test]
    fn test_fade_in_then_out() {
        let mut env = GainEnvelope::constant(0.0);
        env.set_value_at(0.0, 1.0)
            .linear_ramp_to(1.0, 2.0)
            .set_value_at(1.0, 8.0)
            .linear_ramp_to(0.0, 10.0);

        assert_eq!(env.value_at(0.5), 0.0);
        assert_eq!(env.value_at(1.5), 0.5);
        assert_eq!(env.value_at(5.0), 1.0);
        assert_eq!(env.value_at(9.0), 0.5);
        assert_eq!(env.value_at(11.0), 0.0);
    }

    #[test]
    fn test_ramp_without_anchor_holds_initial() {
        let mut env = GainEnvelope::constant(0.3);
        env.linear_ramp_to(1.0, 2.0);
        assert_eq!(env.value_at(1.0), 0.3);
        assert_eq!(env.value_at(2.0), 1.0);
    }
}
