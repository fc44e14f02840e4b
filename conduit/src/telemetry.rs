// src/telemetry.rs

//! Opt-in instrumentation of the conduit relays.
//!
//! With the `fibre_telemetry` feature enabled, the relays record timestamped
//! events and bump named counters in a process-wide collector that can be
//! printed or queried afterwards. Without the feature every function here is an
//! empty inline stub and `counter_value` always reports zero.
//!
//! `events` and `TelemetryEvent` only exist with the feature enabled, since
//! there is nothing to return without a collector. Code that inspects recorded
//! events should be gated on `fibre_telemetry` as well.

#[cfg(feature = "fibre_telemetry")]
pub mod enabled {
  use std::collections::HashMap;
  use std::fmt;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::thread::{self, ThreadId};
  use std::time::Instant;

  use parking_lot::Mutex;
  use tokio::task::Id as TokioTaskId;

  static NEXT_EVENT_SEQUENCE_ID: AtomicUsize = AtomicUsize::new(0);

  #[derive(Clone)]
  pub struct TelemetryEvent {
    pub seq_id: usize,
    pub timestamp: Instant,
    pub os_thread_id: ThreadId,
    /// Set when the event was recorded from inside a Tokio task.
    pub tokio_task_id: Option<TokioTaskId>,
    pub location: &'static str,
    pub event_type: &'static str,
    pub message: Option<String>,
  }

  impl fmt::Debug for TelemetryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("TelemetryEvent")
        .field("seq", &self.seq_id)
        .field("os_tid", &self.os_thread_id)
        .field("tokio_tid", &self.tokio_task_id.map(|id| id.to_string()).as_deref().unwrap_or("N/A"))
        .field("loc", &self.location)
        .field("evt", &self.event_type)
        .field("msg", &self.message.as_deref().unwrap_or(""))
        .finish()
    }
  }

  type CounterKey = (&'static str, &'static str); // (location, counter_name)

  struct CollectorData {
    events: Vec<TelemetryEvent>,
    counters: HashMap<CounterKey, usize>,
    start_time: Instant,
  }

  impl CollectorData {
    fn new() -> Self {
      CollectorData {
        events: Vec::new(),
        counters: HashMap::new(),
        start_time: Instant::now(),
      }
    }
  }

  lazy_static::lazy_static! {
    static ref GLOBAL_COLLECTOR: Mutex<CollectorData> = Mutex::new(CollectorData::new());
  }

  pub fn log_event_fn(location: &'static str, event_type: &'static str, message: Option<String>) {
    let event = TelemetryEvent {
      seq_id: NEXT_EVENT_SEQUENCE_ID.fetch_add(1, Ordering::Relaxed),
      timestamp: Instant::now(),
      os_thread_id: thread::current().id(),
      tokio_task_id: tokio::task::try_id(),
      location,
      event_type,
      message,
    };
    GLOBAL_COLLECTOR.lock().events.push(event);
  }

  pub fn increment_counter_fn(location: &'static str, counter_name: &'static str) {
    *GLOBAL_COLLECTOR
      .lock()
      .counters
      .entry((location, counter_name))
      .or_insert(0) += 1;
  }

  pub fn counter_value_fn(location: &'static str, counter_name: &'static str) -> usize {
    GLOBAL_COLLECTOR
      .lock()
      .counters
      .get(&(location, counter_name))
      .copied()
      .unwrap_or(0)
  }

  /// Events recorded so far, in sequence order.
  pub fn events_fn() -> Vec<TelemetryEvent> {
    let mut events = GLOBAL_COLLECTOR.lock().events.clone();
    events.sort_by_key(|e| e.seq_id);
    events
  }

  pub fn print_telemetry_report_fn() {
    let collector = GLOBAL_COLLECTOR.lock();
    println!("\n--- Fibre Conduit Telemetry Report ---");
    println!("Collection started at: {:?}", collector.start_time);

    if collector.events.is_empty() {
      println!("\n[Events] No events recorded.");
    } else {
      println!("\n[Events] Recorded Events ({}):", collector.events.len());
      let mut sorted_events = collector.events.clone();
      sorted_events.sort_by_key(|e| e.seq_id);

      for event in sorted_events.iter() {
        let since_start = event.timestamp.duration_since(collector.start_time);
        let tokio_tid = event
          .tokio_task_id
          .map(|id| id.to_string())
          .unwrap_or_else(|| "---".to_string());
        println!(
          "  +{:<10.6}s [Seq:{:<5}] OS_TID:{:<12?} TaskID:{:<6} Loc:{:<18} Evt:{:<14} Msg: {}",
          since_start.as_secs_f64(),
          event.seq_id,
          event.os_thread_id,
          tokio_tid,
          event.location,
          event.event_type,
          event.message.as_deref().unwrap_or("")
        );
      }
    }

    if collector.counters.is_empty() {
      println!("\n[Counters] No counters recorded.");
    } else {
      println!("\n[Counters] Recorded Counters ({}):", collector.counters.len());
      let mut sorted_counters: Vec<_> = collector.counters.iter().collect();
      sorted_counters.sort_by_key(|(k, _v)| **k);
      for ((loc, name), count) in sorted_counters {
        println!("  Loc:{:<18} Counter:{:<14} Value: {}", loc, name, count);
      }
    }
    println!("\n--- End of Telemetry Report ---");
  }

  pub fn clear_telemetry_fn() {
    let mut collector = GLOBAL_COLLECTOR.lock();
    collector.events.clear();
    collector.counters.clear();
    collector.start_time = Instant::now();
    NEXT_EVENT_SEQUENCE_ID.store(0, Ordering::Relaxed);
  }
}

#[cfg(not(feature = "fibre_telemetry"))]
pub mod disabled {
  #[inline(always)]
  pub fn log_event_fn(_location: &'static str, _event_type: &'static str, _message: Option<String>) {}
  #[inline(always)]
  pub fn increment_counter_fn(_location: &'static str, _counter_name: &'static str) {}
  #[inline(always)]
  pub fn counter_value_fn(_location: &'static str, _counter_name: &'static str) -> usize {
    0
  }
  #[inline(always)]
  pub fn print_telemetry_report_fn() {}
  #[inline(always)]
  pub fn clear_telemetry_fn() {}
}

#[cfg(feature = "fibre_telemetry")]
pub use enabled::{
  clear_telemetry_fn as clear_telemetry, counter_value_fn as counter_value, events_fn as events,
  increment_counter_fn as increment_counter, log_event_fn as log_event,
  print_telemetry_report_fn as print_telemetry_report, TelemetryEvent,
};

#[cfg(not(feature = "fibre_telemetry"))]
pub use disabled::{
  clear_telemetry_fn as clear_telemetry, counter_value_fn as counter_value,
  increment_counter_fn as increment_counter, log_event_fn as log_event,
  print_telemetry_report_fn as print_telemetry_report,
};

/// Locations and event names recorded by the relays.
pub(crate) mod names {
  pub(crate) const INTAKE: &str = "conduit::intake";
  pub(crate) const OUTTAKE: &str = "conduit::outtake";
  pub(crate) const RECEIVER: &str = "conduit::receiver";

  pub(crate) const ENQUEUED: &str = "Enqueued";
  pub(crate) const DELIVERED: &str = "Delivered";
  pub(crate) const DROPPED: &str = "Dropped";
  pub(crate) const CANCELLED: &str = "Cancelled";
  pub(crate) const BUFFER_CLOSED: &str = "BufferClosed";
  pub(crate) const OUTLET_CLOSED: &str = "OutletClosed";
}
