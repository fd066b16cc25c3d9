// src/gesture/smoother.rs

use std::collections::VecDeque;

/// Rolling-mode filter over the last `window` readings.
///
/// A window of 1 passes readings straight through. Ties go to the value
/// whose earliest occurrence in the window comes first.
#[derive(Clone, Debug)]
pub struct ModeSmoother<T> {
    window: usize,
    history: VecDeque<T>,
}

impl<T: Copy + PartialEq> ModeSmoother<T> {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self { window, history: VecDeque::with_capacity(window) }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Resize; shrinking drops the oldest readings.
    pub fn set_window(&mut self, window: usize) {
        self.window = window.max(1);
        while self.history.len() > self.window {
            self.history.pop_front();
        }
    }

    pub fn push(&mut self, value: T) -> T {
        self.history.push_back(value);
        while self.history.len() > self.window {
            self.history.pop_front();
        }
        // history is non-empty here
        self.mode().unwrap_or(value)
    }

    pub fn mode(&self) -> Option<T> {
        let mut best: Option<(T, usize)> = None;
        for (i, candidate) in self.history.iter().enumerate() {
            // only score a value at its first occurrence
            if self.history.iter().take(i).any(|v| v == candidate) {
                continue;
            }
            let count = self.history.iter().filter(|v| *v == candidate).count();
            match best {
                Some((_, best_count)) if best_count >= count => {}
                _ => best = Some((*candidate, count)),
            }
        }
        best.map(|(v, _)| v)
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_of_one_is_a_pass_through() {
        let mut s = ModeSmoother::new(1);
        for v in [3u8, 0, 5, 5, 1, 2] {
            assert_eq!(s.push(v), v);
        }
    }

    #[test]
    fn returns_mode_of_last_k() {
        let mut s = ModeSmoother::new(5);
        let stream = [1u8, 2, 2, 3, 3, 3, 4, 4, 2];
        let out: Vec<u8> = stream.iter().map(|v| s.push(*v)).collect();
        // windows: [1] [1,2] [1,2,2] [1,2,2,3] [1,2,2,3,3] [2,2,3,3,3] [2,3,3,3,4] [3,3,3,4,4] [3,3,4,4,2]
        assert_eq!(out, vec![1, 1, 2, 2, 2, 3, 3, 3, 3]);
    }

    #[test]
    fn ties_go_to_first_seen_in_window() {
        let mut s = ModeSmoother::new(4);
        s.push(4u8);
        s.push(2);
        s.push(2);
        assert_eq!(s.push(4), 4);
        // 4 falls out of the window: [2,2,4,1] -> 2
        assert_eq!(s.push(1), 2);
    }

    #[test]
    fn shrinking_keeps_newest() {
        let mut s = ModeSmoother::new(5);
        for v in [1u8, 1, 1, 5, 5] {
            s.push(v);
        }
        assert_eq!(s.mode(), Some(1));
        s.set_window(2);
        assert_eq!(s.mode(), Some(5));
    }

    #[test]
    fn works_over_optional_counts() {
        let mut s: ModeSmoother<Option<u8>> = ModeSmoother::new(3);
        s.push(Some(2));
        s.push(None);
        assert_eq!(s.push(Some(2)), Some(2));
    }
}
