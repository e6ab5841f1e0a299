/// Streaming RSI (Relative Strength Index) with Wilder's smoothing.
///
/// The simulator walks bars one at a time, so the indicator is fed
/// incrementally: `push` consumes one close and yields the RSI once
/// `period + 1` closes have been seen. By convention RSI is 100 when the
/// average loss is zero.
#[derive(Debug, Clone)]
pub struct RollingRsi {
    period: usize,
    prev_close: Option<f64>,
    /// Price changes collected during warmup, before smoothing starts.
    warmup: Vec<f64>,
    avg_gain: f64,
    avg_loss: f64,
    primed: bool,
}

impl RollingRsi {
    pub fn new(period: usize) -> Self {
        assert!(period >= 2, "RSI period must be >= 2");
        Self {
            period,
            prev_close: None,
            warmup: Vec::with_capacity(period),
            avg_gain: 0.0,
            avg_loss: 0.0,
            primed: false,
        }
    }

    /// Feed one close (in time order). Returns the RSI once primed.
    pub fn push(&mut self, close: f64) -> Option<f64> {
        let prev = match self.prev_close.replace(close) {
            Some(p) => p,
            None => return None,
        };
        let change = close - prev;

        if !self.primed {
            self.warmup.push(change);
            if self.warmup.len() < self.period {
                return None;
            }
            let n = self.period as f64;
            self.avg_gain = self.warmup.iter().filter(|&&c| c > 0.0).sum::<f64>() / n;
            self.avg_loss =
                self.warmup.iter().filter(|&&c| c < 0.0).map(|c| c.abs()).sum::<f64>() / n;
            self.primed = true;
            return Some(self.value());
        }

        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        let n = self.period as f64;
        self.avg_gain = (self.avg_gain * (n - 1.0) + gain) / n;
        self.avg_loss = (self.avg_loss * (n - 1.0) + loss) / n;
        Some(self.value())
    }

    fn value(&self) -> f64 {
        if self.avg_loss == 0.0 {
            return 100.0;
        }
        let rs = self.avg_gain / self.avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}
