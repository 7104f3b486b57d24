//! Walkthrough of a memory store and a file store.
//!
//! ```text
//! cargo run --example demo [path]
//! ```

use plustree::encoding::{field_to_string, numeric_key, text_field};
use plustree::{Engine, Geometry, Options, Result};

const KEY_LEN: usize = 16;
const DATA_LEN: usize = 32;

fn main() -> Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "data.btp".to_string());

    println!("=== plustree demo ===");
    memory_demo()?;
    file_demo(&path)?;
    println!("Done.");
    Ok(())
}

/// Numeric keys in a write-through memory store.
fn memory_demo() -> Result<()> {
    let geometry = Geometry::new(KEY_LEN, DATA_LEN, 8);
    let mut engine = Engine::create_memory(geometry, Options::default().with_cache(false))?;

    for (id, name) in [(1001, "John Doe"), (1002, "Maria"), (1003, "Alice")] {
        if !engine.insert(&numeric_key(id, KEY_LEN)?, &text_field(name, DATA_LEN))? {
            println!("Insert skipped (duplicate): {}", id);
        }
    }

    let mut out = [0u8; DATA_LEN];
    if engine.find(&numeric_key(1002, KEY_LEN)?, &mut out)? {
        println!("[mem] 1002 -> {}", field_to_string(&out));
    }

    engine.commit()?;
    engine.close()
}

/// Text keys in a cached file store, read back after reopening.
fn file_demo(path: &str) -> Result<()> {
    let geometry = Geometry::new(KEY_LEN, DATA_LEN, 16);
    let mut engine = Engine::create_or_open(path, geometry, Options::default())?;

    for (key, name) in [("customer:1001", "John Doe"), ("customer:1002", "Maria")] {
        if !engine.insert(&text_field(key, KEY_LEN), &text_field(name, DATA_LEN))? {
            println!("Insert skipped (duplicate): {}", key);
        }
    }
    engine.commit()?;
    engine.close()?;

    let mut reopened = Engine::open_existing(path, Options::default())?;
    let mut out = [0u8; DATA_LEN];
    for key in ["customer:1001", "customer:1002", "customer:9999"] {
        if reopened.find(&text_field(key, KEY_LEN), &mut out)? {
            println!("[disk] {} -> {}", key, field_to_string(&out));
        } else {
            println!("[disk] {} not found", key);
        }
    }
    reopened.close()
}
