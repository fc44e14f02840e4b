#![allow(dead_code)]

use std::time::{Duration, Instant};

pub const SHORT_TIMEOUT: Duration = Duration::from_millis(50);
pub const LONG_TIMEOUT: Duration = Duration::from_secs(3);
pub const ITEMS_LOW: usize = 50;
pub const ITEMS_MEDIUM: usize = 200;
pub const ITEMS_HIGH: usize = 1000;

/// Polls `cond` until it holds or `LONG_TIMEOUT` elapses.
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
  let start = Instant::now();
  while start.elapsed() < LONG_TIMEOUT {
    if cond() {
      return true;
    }
    std::thread::sleep(Duration::from_millis(5));
  }
  cond()
}
