#![forbid(unsafe_code)]

//! Host input events, already reduced to what navigation needs.
//!
//! The host translates DOM events into [`InputEvent`]s. Hit testing stays on
//! the host side: wheel events carry whether they landed over a surface's
//! interactive region, clicks carry a [`ClickTarget`].
//!
//! The JSON form is internally tagged:
//!
//! ```json
//! { "kind": "wheel", "delta_y": 120.0, "target": "page" }
//! { "kind": "key", "key": "ArrowDown" }
//! { "kind": "button", "button": "next" }
//! ```

use serde::{Deserialize, Serialize};

pub use crate::panel::ClickTarget;

/// One navigation-relevant input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputEvent {
    Wheel {
        delta_y: f64,
        #[serde(default)]
        target: WheelTarget,
    },
    TouchStart {
        y: f64,
    },
    TouchEnd {
        y: f64,
    },
    Key {
        key: NavKey,
    },
    Button {
        button: NavButton,
    },
    Click {
        target: ClickTarget,
    },
}

impl InputEvent {
    #[must_use]
    pub const fn wheel(delta_y: f64) -> Self {
        Self::Wheel {
            delta_y,
            target: WheelTarget::Page,
        }
    }

    #[must_use]
    pub const fn key(key: NavKey) -> Self {
        Self::Key { key }
    }

    #[must_use]
    pub const fn button(button: NavButton) -> Self {
        Self::Button { button }
    }

    #[must_use]
    pub const fn click(target: ClickTarget) -> Self {
        Self::Click { target }
    }
}

/// Where a wheel event landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WheelTarget {
    /// Anywhere that scrolls the story.
    #[default]
    Page,
    /// Over a surface's interactive region, where the wheel zooms the image.
    Surface,
}

/// Keys with a navigation or panel binding. Serialized as DOM key names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NavKey {
    ArrowDown,
    ArrowUp,
    ArrowLeft,
    ArrowRight,
    PageDown,
    PageUp,
    #[serde(rename = " ", alias = "Space", alias = "Spacebar")]
    Space,
    Escape,
}

impl NavKey {
    /// Parse a DOM `KeyboardEvent.key` value. Unbound keys yield `None`.
    #[must_use]
    pub fn from_dom_key(key: &str) -> Option<Self> {
        Some(match key {
            "ArrowDown" => Self::ArrowDown,
            "ArrowUp" => Self::ArrowUp,
            "ArrowLeft" => Self::ArrowLeft,
            "ArrowRight" => Self::ArrowRight,
            "PageDown" => Self::PageDown,
            "PageUp" => Self::PageUp,
            " " | "Space" | "Spacebar" => Self::Space,
            "Escape" | "Esc" => Self::Escape,
            _ => return None,
        })
    }
}

/// On-screen previous/next controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavButton {
    Previous,
    Next,
}
