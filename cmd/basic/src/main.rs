//! Basic weft example
//!
//! Spawns a few uthreads that yield, sleep and join each other.
//!
//! Recognized options: --numCores N, --maxNumCores N, --stackSize N

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use weft::{Runtime, RuntimeConfig};

fn main() {
    let mut args: Vec<String> = std::env::args().collect();
    let mut config = RuntimeConfig::from_env();
    if let Err(e) = config.apply_args(&mut args) {
        eprintln!("weft-basic: {}", e);
        std::process::exit(2);
    }

    println!("=== weft basic example ===");
    println!(
        "cores: {} (max {}), stack: {} KiB\n",
        config.num_cores,
        config.max_num_cores,
        config.stack_size / 1024
    );

    let mut runtime = Runtime::new(config).expect("runtime init");
    let completed = Arc::new(AtomicUsize::new(0));

    runtime.block_on(|| {
        // A chatty uthread that yields in the middle.
        let c = Arc::clone(&completed);
        let yielder = weft::spawn(move || {
            println!("[yielder] hello");
            weft::yield_now();
            println!("[yielder] back after yield");
            c.fetch_add(1, Ordering::Relaxed);
        })
        .expect("spawn yielder");

        // A sleeper with a deadline.
        let c = Arc::clone(&completed);
        let sleeper = weft::spawn(move || {
            println!("[sleeper] napping 2ms");
            weft::sleep(Duration::from_millis(2));
            println!("[sleeper] awake");
            c.fetch_add(1, Ordering::Relaxed);
        })
        .expect("spawn sleeper");

        // A waiter that joins both from uthread context.
        let c = Arc::clone(&completed);
        let waiter = weft::spawn(move || {
            weft::join(yielder);
            weft::join(sleeper);
            println!("[waiter] both joined");
            c.fetch_add(1, Ordering::Relaxed);
        })
        .expect("spawn waiter");

        weft::join(waiter);
    });

    println!("\ncompleted {} uthreads", completed.load(Ordering::Relaxed));
}
