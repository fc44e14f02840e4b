use super::Buffer;

use parking_lot::{Condvar, Mutex};
use std::fmt;

type LessFn<T> = dyn Fn(&T, &T) -> bool + Send + Sync;

struct HeapState<T> {
  /// Binary heap in a dense array: the children of `i` live at `2i + 1` and
  /// `2i + 2`, and no child is `less` than its parent.
  items: Vec<T>,
  closed: bool,
}

/// A priority buffer backed by a binary min-heap.
///
/// The item handed out next is always the least one currently held according
/// to the `less` function the heap was built with. Items that compare equal
/// come out in no particular order.
///
/// ```
/// use fibre_conduit::buffer::{Buffer, Heap};
///
/// let heap = Heap::with_less(|a: &u32, b: &u32| a > b);
/// heap.enqueue(1);
/// heap.enqueue(3);
/// heap.enqueue(2);
/// heap.close();
/// assert_eq!(heap.dequeue(), Some(3));
/// assert_eq!(heap.dequeue(), Some(2));
/// assert_eq!(heap.dequeue(), Some(1));
/// assert_eq!(heap.dequeue(), None);
/// ```
pub struct Heap<T> {
  state: Mutex<HeapState<T>>,
  not_empty: Condvar,
  less: Box<LessFn<T>>,
}

impl<T> fmt::Debug for Heap<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock();
    f.debug_struct("Heap")
      .field("len", &state.items.len())
      .field("closed", &state.closed)
      .finish_non_exhaustive()
  }
}

impl<T: Ord + 'static> Default for Heap<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Ord + 'static> Heap<T> {
  /// Creates a heap that hands out the smallest item first, using `T`'s
  /// natural ordering.
  pub fn new() -> Self {
    Self::with_less(|a: &T, b: &T| a < b)
  }
}

impl<T> Heap<T> {
  /// Creates a heap ordered by `less`, which must be a strict weak ordering.
  /// The item for which `less` holds against every other item is handed out
  /// first.
  pub fn with_less<F>(less: F) -> Self
  where
    F: Fn(&T, &T) -> bool + Send + Sync + 'static,
  {
    Self {
      state: Mutex::new(HeapState {
        items: Vec::new(),
        closed: false,
      }),
      not_empty: Condvar::new(),
      less: Box::new(less),
    }
  }

  /// Number of items currently held.
  pub fn len(&self) -> usize {
    self.state.lock().items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.state.lock().items.is_empty()
  }

  /// Whether `close` has been called. Items may still be pending.
  pub fn is_closed(&self) -> bool {
    self.state.lock().closed
  }
}

impl<T: Send> Buffer<T> for Heap<T> {
  fn enqueue(&self, item: T) {
    let mut state = self.state.lock();
    state.items.push(item);
    sift_up(&mut state.items, &*self.less);
    self.not_empty.notify_one();
  }

  fn dequeue(&self) -> Option<T> {
    let mut state = self.state.lock();
    while state.items.is_empty() && !state.closed {
      self.not_empty.wait(&mut state);
    }
    pop_root(&mut state.items, &*self.less)
  }

  fn close(&self) {
    let mut state = self.state.lock();
    state.closed = true;
    self.not_empty.notify_all();
  }
}

/// Removes the root, refills it with the last element and restores the heap.
fn pop_root<T>(items: &mut Vec<T>, less: &LessFn<T>) -> Option<T> {
  if items.is_empty() {
    return None;
  }
  let last = items.len() - 1;
  items.swap(0, last);
  let root = items.pop();
  sift_down(items, less);
  root
}

/// Moves the last element toward the root until its parent is `less` than it.
fn sift_up<T>(items: &mut [T], less: &LessFn<T>) {
  let Some(mut i) = items.len().checked_sub(1) else {
    return;
  };
  while i > 0 {
    let parent = (i - 1) / 2;
    if less(&items[parent], &items[i]) {
      break;
    }
    items.swap(parent, i);
    i = parent;
  }
}

/// Moves the root toward the leaves, swapping with the smaller child, until it
/// is `less` than that child or has no children.
fn sift_down<T>(items: &mut [T], less: &LessFn<T>) {
  let len = items.len();
  let mut i = 0;
  loop {
    let left = 2 * i + 1;
    if left >= len {
      break;
    }

    let right = left + 1;
    let mut child = left;
    if right < len && less(&items[right], &items[left]) {
      child = right;
    }

    if less(&items[i], &items[child]) {
      break;
    }

    items.swap(i, child);
    i = child;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use proptest::prelude::*;
  use std::sync::Arc;
  use std::thread;
  use std::time::Duration;

  fn natural(a: &i32, b: &i32) -> bool {
    a < b
  }

  /// No child is strictly less than its parent.
  fn is_heap(items: &[i32]) -> bool {
    (1..items.len()).all(|i| !natural(&items[i], &items[(i - 1) / 2]))
  }

  #[test]
  fn natural_order_yields_smallest_first() {
    let heap = Heap::new();
    for i in [2, 1, 0] {
      heap.enqueue(i);
    }
    heap.close();
    assert_eq!(heap.dequeue(), Some(0));
    assert_eq!(heap.dequeue(), Some(1));
    assert_eq!(heap.dequeue(), Some(2));
    assert_eq!(heap.dequeue(), None);
  }

  #[test]
  fn custom_less_reverses_order() {
    let heap = Heap::with_less(|a: &i32, b: &i32| a > b);
    for i in [0, 2, 1] {
      heap.enqueue(i);
    }
    assert_eq!(heap.len(), 3);
    assert_eq!(heap.dequeue(), Some(2));
    assert_eq!(heap.dequeue(), Some(1));
    assert_eq!(heap.dequeue(), Some(0));
    assert!(heap.is_empty());
  }

  #[test]
  fn orders_by_key_of_non_ord_items() {
    #[derive(Debug, PartialEq)]
    struct Job {
      priority: f64,
      name: &'static str,
    }
    let heap = Heap::with_less(|a: &Job, b: &Job| a.priority < b.priority);
    heap.enqueue(Job { priority: 2.5, name: "later" });
    heap.enqueue(Job { priority: 0.5, name: "first" });
    heap.enqueue(Job { priority: 1.0, name: "second" });
    let names: Vec<_> = (0..3).filter_map(|_| heap.dequeue()).map(|j| j.name).collect();
    assert_eq!(names, vec!["first", "second", "later"]);
  }

  #[test]
  fn right_child_wins_only_when_strictly_less() {
    // Root 9 with equal children: sift down must pick the left child.
    let mut items = vec![9, 4, 4, 7, 8, 6, 5];
    sift_down(&mut items, &natural);
    assert_eq!(items[0], 4);
    assert_eq!(items[1], 7);
    assert!(is_heap(&items));
  }

  #[test]
  fn sift_up_on_empty_and_single() {
    let mut empty: Vec<i32> = Vec::new();
    sift_up(&mut empty, &natural);
    let mut single = vec![1];
    sift_up(&mut single, &natural);
    assert_eq!(single, vec![1]);
    assert_eq!(pop_root(&mut single, &natural), Some(1));
    assert_eq!(pop_root(&mut single, &natural), None);
  }

  #[test]
  fn dequeue_blocks_until_close() {
    let heap = Arc::new(Heap::<u64>::new());
    let consumer = {
      let heap = Arc::clone(&heap);
      thread::spawn(move || heap.dequeue())
    };
    thread::sleep(Duration::from_millis(50));
    assert!(!consumer.is_finished());
    heap.close();
    assert!(heap.is_closed());
    assert_eq!(consumer.join().unwrap(), None);
  }

  #[derive(Debug, Clone)]
  enum Op {
    Push(i32),
    Pop,
  }

  fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
      3 => any::<i32>().prop_map(Op::Push),
      2 => Just(Op::Pop),
    ]
  }

  proptest! {
    #[test]
    fn invariant_holds_under_any_interleaving(ops in prop::collection::vec(op(), 0..200)) {
      let mut items = Vec::new();
      let mut model: Vec<i32> = Vec::new();
      for op in ops {
        match op {
          Op::Push(v) => {
            items.push(v);
            sift_up(&mut items, &natural);
            model.push(v);
          }
          Op::Pop => {
            let popped = pop_root(&mut items, &natural);
            let expected = model.iter().copied().min();
            prop_assert_eq!(popped, expected);
            if let Some(v) = expected {
              let pos = model.iter().position(|&m| m == v).unwrap();
              model.swap_remove(pos);
            }
          }
        }
        prop_assert!(is_heap(&items));
      }
    }

    #[test]
    fn drains_in_non_decreasing_order(values in prop::collection::vec(any::<i32>(), 0..300)) {
      let heap = Heap::new();
      for v in &values {
        heap.enqueue(*v);
      }
      heap.close();
      let mut drained = Vec::with_capacity(values.len());
      while let Some(v) = heap.dequeue() {
        drained.push(v);
      }
      let mut sorted = values.clone();
      sorted.sort();
      prop_assert_eq!(drained, sorted);
    }
  }
}
