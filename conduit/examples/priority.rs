// examples/priority.rs
use fibre_conduit::buffer::Heap;
use fibre_conduit::error::RecvError;
use fibre_conduit::{unbounded, ConduitBuilder};
use std::{thread, time::Duration};

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Job {
  priority: u8,
  name: String,
}

fn main() {
  println!("--- FIFO conduit: producers never wait on the consumer ---");
  {
    let (tx, rx) = unbounded::<String>();
    let num_producers = 3;
    let mut handles = Vec::new();

    for i in 0..num_producers {
      let tx_clone = tx.clone();
      handles.push(thread::spawn(move || {
        for j in 0..3 {
          let msg = format!("P{}-M{}", i, j);
          println!("[Producer {}] Sending: {}", i, msg);
          tx_clone.send(msg).unwrap();
        }
      }));
    }
    drop(tx);

    for handle in handles {
      handle.join().unwrap();
    }
    println!("[Main] All producers finished before anything was received.");

    for msg in rx {
      println!("[Consumer] Received: {}", msg);
    }
  }

  println!("\n--- Heap conduit: most urgent job first ---");
  {
    // Higher priority first.
    let (tx, mut rx) = ConduitBuilder::new()
      .buffer(Heap::with_less(|a: &Job, b: &Job| a.priority > b.priority))
      .name("jobs")
      .build()
      .expect("failed to spawn conduit relays");

    for (priority, name) in [(1, "cleanup"), (9, "page on-call"), (5, "reindex")] {
      tx.send(Job {
        priority,
        name: name.to_string(),
      })
      .unwrap();
    }

    let late = {
      let tx = tx.clone();
      thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        tx.send(Job {
          priority: 7,
          name: "rotate keys".to_string(),
        })
        .unwrap();
      })
    };
    drop(tx);

    loop {
      match rx.recv() {
        Ok(job) => {
          println!("[Worker] Running {:?} (priority {})", job.name, job.priority);
          thread::sleep(Duration::from_millis(15));
        }
        Err(RecvError::Disconnected) => {
          println!("[Worker] Queue drained and closed.");
          break;
        }
      }
    }
    late.join().unwrap();
  }

  println!("\n--- Early close: the consumer walks away ---");
  {
    let (tx, mut rx) = unbounded();
    for i in 0..5 {
      tx.send(i).unwrap();
    }
    println!("[Consumer] First item: {:?}", rx.recv());
    rx.close();
    println!("[Consumer] After close: {:?}", rx.recv());
    println!("[Producer] Still accepted: {:?}", tx.send(99).is_ok());
  }
}
