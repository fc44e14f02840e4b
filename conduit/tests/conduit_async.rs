mod common;
use common::*;

use fibre_conduit::buffer::Heap;
use fibre_conduit::error::RecvError;
use fibre_conduit::ConduitBuilder;

use futures_util::StreamExt;
use std::time::Duration;

#[tokio::test]
async fn async_recv_in_send_order() {
  let (tx, mut rx) = ConduitBuilder::new().build_async().unwrap();
  tx.send(1).unwrap();
  tx.send(2).unwrap();
  assert_eq!(rx.recv().await, Ok(1));
  assert_eq!(rx.recv().await, Ok(2));
  drop(tx);
  assert_eq!(rx.recv().await, Err(RecvError::Disconnected));
  assert_eq!(rx.recv().await, Err(RecvError::Disconnected));
  assert!(rx.is_closed());
}

#[tokio::test]
async fn async_heap_delivers_least_first() {
  let (tx, rx) = ConduitBuilder::new().buffer(Heap::new()).build_async().unwrap();
  for v in [2, 1, 0] {
    tx.send(v).unwrap();
  }
  drop(tx);
  let received: Vec<i32> = rx.collect().await;
  assert_eq!(received, vec![0, 1, 2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn async_recv_waits_for_producer_thread() {
  let (tx, mut rx) = ConduitBuilder::new().build_async().unwrap();
  let producer = std::thread::spawn(move || {
    for i in 0..ITEMS_MEDIUM {
      if i % 50 == 0 {
        std::thread::sleep(Duration::from_millis(1));
      }
      tx.send(i).unwrap();
    }
  });

  let mut expected = 0;
  while let Ok(v) = rx.recv().await {
    assert_eq!(v, expected);
    expected += 1;
  }
  assert_eq!(expected, ITEMS_MEDIUM);
  producer.join().unwrap();
}

#[tokio::test]
async fn dropped_recv_future_does_not_lose_items() {
  let (tx, mut rx) = ConduitBuilder::new().build_async().unwrap();

  let timed_out = tokio::time::timeout(SHORT_TIMEOUT, rx.recv()).await;
  assert!(timed_out.is_err());

  tx.send("after timeout").unwrap();
  let got = tokio::time::timeout(LONG_TIMEOUT, rx.recv()).await.unwrap();
  assert_eq!(got, Ok("after timeout"));
}

#[tokio::test]
async fn heap_orders_items_sent_after_a_dropped_recv_future() {
  let (tx, mut rx) = ConduitBuilder::new().buffer(Heap::new()).build_async().unwrap();

  let timed_out = tokio::time::timeout(SHORT_TIMEOUT, rx.recv()).await;
  assert!(timed_out.is_err());

  tx.send(5).unwrap();
  tx.send(1).unwrap();
  assert_eq!(rx.recv().await, Ok(1));
  assert_eq!(rx.recv().await, Ok(5));
}

#[tokio::test]
async fn producer_close_wakes_pending_async_receiver() {
  let (tx, mut rx) = ConduitBuilder::<u32>::new().build_async().unwrap();
  let closer = tokio::spawn(async move {
    tokio::time::sleep(SHORT_TIMEOUT).await;
    drop(tx);
  });

  let res = tokio::time::timeout(LONG_TIMEOUT, rx.recv()).await.unwrap();
  assert_eq!(res, Err(RecvError::Disconnected));
  closer.await.unwrap();

  rx.close();
  rx.close();
  assert!(rx.is_closed());
}

#[tokio::test]
async fn close_ends_stream_with_items_pending() {
  let (tx, mut rx) = ConduitBuilder::new().build_async().unwrap();
  for i in 0..ITEMS_LOW {
    tx.send(i).unwrap();
  }
  assert_eq!(rx.next().await, Some(0));
  rx.close();
  assert_eq!(rx.next().await, None);
}

#[tokio::test]
async fn converts_between_sync_and_async() {
  let (tx, rx) = fibre_conduit::unbounded();
  let mut rx = rx.to_async();
  tx.send(7u8).unwrap();
  assert_eq!(rx.recv().await, Ok(7));

  let mut rx = rx.to_sync();
  tx.send(8).unwrap();
  let got = tokio::task::spawn_blocking(move || rx.recv()).await.unwrap();
  assert_eq!(got, Ok(8));
}
