//! A theme preference that survives restarts.
//!
//! Run it twice: the second run starts from the theme the first one saved.

use serde::{Deserialize, Serialize};
use tincan_persist::storage::FileStorage;
use tincan_persist::{create_effect, use_persisted};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Appearance {
    theme: String,
    font_size: u8,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Persisted Theme ===\n");

    let path = std::env::temp_dir().join("tincan-persist-theme.json");
    println!("1. Opening {}", path.display());
    let storage = FileStorage::open(&path)?;

    let (appearance, set_appearance) = use_persisted(
        storage,
        "appearance",
        Appearance {
            theme: "light".to_string(),
            font_size: 14,
        },
    )?;
    println!("   Loaded: {:?}", appearance.get());

    println!("\n2. Rendering on every change");
    let _render = create_effect({
        let appearance = appearance.clone();
        move || {
            appearance.with(|a| println!("   [Render] {} theme, {}px", a.theme, a.font_size));
        }
    });

    println!("\n3. Toggling the theme");
    let next = if appearance.with(|a| a.theme == "light") {
        "dark"
    } else {
        "light"
    };
    appearance.update(|a| a.theme = next.to_string());

    println!("\n4. Growing the font");
    let mut bigger = appearance.get();
    bigger.font_size += 1;
    set_appearance.set(bigger);

    println!("\nSaved to {}", path.display());
    Ok(())
}
