use std::collections::VecDeque;

/// Rolling mean over the last `capacity` samples
#[derive(Debug, Clone)]
pub struct RollingSampler {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl RollingSampler {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Mean of the retained samples, `None` before the first push
    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_empty() {
        assert_eq!(RollingSampler::new(4).mean(), None);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut sampler = RollingSampler::new(3);
        for v in [10.0, 20.0, 30.0, 40.0] {
            sampler.push(v);
        }
        assert_eq!(sampler.len(), 3);
        assert_eq!(sampler.mean(), Some(30.0));
    }
}
