//! The virtual timer queue.
//!
//! A single queue ordered by scheduled time with insertion-order ties. The
//! cooperative driver fires due timers when the main task is idle;
//! cancellation only marks the record, so a `clearTimeout` issued inside a
//! firing callback is honored on the next pass.

use crate::value::Value;

#[derive(Debug)]
pub struct Timer {
    pub id: u32,
    pub callback: Value,
    pub args: Vec<Value>,
    pub scheduled_time: f64,
    pub interval_ms: f64,
    pub is_interval: bool,
    pub is_cancelled: bool,
    pub has_ref: bool,
    /// Insertion sequence, the tie-break for equal scheduled times.
    pub seq: u64,
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    timers: Vec<Timer>,
    next_id: u32,
    next_seq: u64,
}

impl TimerQueue {
    pub fn schedule(
        &mut self,
        callback: Value,
        args: Vec<Value>,
        now_ms: f64,
        delay: f64,
        is_interval: bool,
    ) -> u32 {
        self.next_id += 1;
        self.next_seq += 1;
        let delay = if delay.is_nan() { 0.0 } else { delay.max(0.0) };
        self.timers.push(Timer {
            id: self.next_id,
            callback,
            args,
            scheduled_time: now_ms + delay,
            interval_ms: delay,
            is_interval,
            is_cancelled: false,
            has_ref: true,
            seq: self.next_seq,
        });
        self.next_id
    }

    /// Mark cancelled. The record stays queued until the next pass.
    pub fn cancel(&mut self, id: u32) {
        if let Some(t) = self.timers.iter_mut().find(|t| t.id == id) {
            t.is_cancelled = true;
        }
    }

    pub fn set_ref(&mut self, id: u32, has_ref: bool) {
        if let Some(t) = self.timers.iter_mut().find(|t| t.id == id) {
            t.has_ref = has_ref;
        }
    }

    /// Any live (non-cancelled) timer still queued?
    pub fn has_live(&self) -> bool {
        self.timers.iter().any(|t| !t.is_cancelled)
    }

    /// Earliest scheduled time among live timers.
    pub fn next_time(&self) -> Option<f64> {
        self.timers
            .iter()
            .filter(|t| !t.is_cancelled)
            .map(|t| t.scheduled_time)
            .fold(None, |acc, t| {
                Some(match acc {
                    None => t,
                    Some(a) if t < a => t,
                    Some(a) => a,
                })
            })
    }

    /// Pop every timer due at `now_ms`, in scheduled-time order with
    /// insertion-order ties. One-shot timers are removed; intervals re-arm.
    /// Cancelled records are dropped.
    pub fn take_due(&mut self, now_ms: f64) -> Vec<(Value, Vec<Value>)> {
        let mut due: Vec<usize> = (0..self.timers.len())
            .filter(|&i| {
                let t = &self.timers[i];
                !t.is_cancelled && t.scheduled_time <= now_ms
            })
            .collect();
        due.sort_by(|&a, &b| {
            let (ta, tb) = (&self.timers[a], &self.timers[b]);
            ta.scheduled_time
                .partial_cmp(&tb.scheduled_time)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(ta.seq.cmp(&tb.seq))
        });
        let mut fired = Vec::with_capacity(due.len());
        for &i in &due {
            let t = &mut self.timers[i];
            fired.push((t.callback.clone(), t.args.clone()));
            if t.is_interval {
                t.scheduled_time += t.interval_ms.max(1.0);
            } else {
                t.is_cancelled = true; // reaped below
            }
        }
        self.timers.retain(|t| !t.is_cancelled);
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_scheduled_order_with_insertion_ties() {
        let mut q = TimerQueue::default();
        q.schedule(Value::Number(1.0), vec![], 0.0, 10.0, false);
        q.schedule(Value::Number(2.0), vec![], 0.0, 5.0, false);
        q.schedule(Value::Number(3.0), vec![], 0.0, 5.0, false);
        let fired = q.take_due(10.0);
        let order: Vec<f64> = fired
            .iter()
            .map(|(cb, _)| cb.as_number().unwrap())
            .collect();
        assert_eq!(order, vec![2.0, 3.0, 1.0]);
        assert!(!q.has_live());
    }

    #[test]
    fn cancelled_timers_do_not_fire() {
        let mut q = TimerQueue::default();
        let id = q.schedule(Value::Number(1.0), vec![], 0.0, 5.0, false);
        q.cancel(id);
        assert!(q.take_due(10.0).is_empty());
        assert!(!q.has_live());
    }

    #[test]
    fn intervals_rearm_by_interval_ms() {
        let mut q = TimerQueue::default();
        q.schedule(Value::Number(1.0), vec![], 0.0, 10.0, true);
        assert_eq!(q.take_due(10.0).len(), 1);
        assert!(q.has_live());
        assert_eq!(q.next_time(), Some(20.0));
        assert_eq!(q.take_due(20.0).len(), 1);
    }

    #[test]
    fn negative_delay_clamps_to_zero() {
        let mut q = TimerQueue::default();
        q.schedule(Value::Number(1.0), vec![], 100.0, -50.0, false);
        assert_eq!(q.next_time(), Some(100.0));
    }
}
