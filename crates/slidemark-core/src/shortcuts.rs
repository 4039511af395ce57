//! Keyboard shortcut mapping and documentation.

use crate::tools::DrawMode;

/// Editor action bound to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorAction {
    /// Toggle a draw mode.
    Draw(DrawMode),
    NextBrushShape,
    /// Grow (+1) or shrink (-1) the brush.
    AdjustBrushSize(i8),
    PrevStyleGroup,
    NextStyleGroup,
    /// Complete the polygon or line being drawn.
    FinishShape,
    /// Show all annotations, or hide them if any is shown.
    ToggleAnnotations,
    NewAnnotation,
    Cancel,
}

/// Map a key (as reported by the keyboard event, case-sensitive) to an action.
pub fn action_for_key(key: &str) -> Option<EditorAction> {
    let action = match key {
        "o" => EditorAction::Draw(DrawMode::Point),
        "r" => EditorAction::Draw(DrawMode::Rectangle),
        "i" => EditorAction::Draw(DrawMode::Ellipse),
        "c" => EditorAction::Draw(DrawMode::Circle),
        "p" => EditorAction::Draw(DrawMode::Polygon),
        "l" => EditorAction::Draw(DrawMode::Line),
        "b" => EditorAction::Draw(DrawMode::Brush),
        "B" => EditorAction::NextBrushShape,
        "[" => EditorAction::AdjustBrushSize(-1),
        "]" => EditorAction::AdjustBrushSize(1),
        "q" => EditorAction::PrevStyleGroup,
        "w" => EditorAction::NextStyleGroup,
        "Enter" => EditorAction::FinishShape,
        "a" => EditorAction::ToggleAnnotations,
        " " => EditorAction::NewAnnotation,
        "Escape" => EditorAction::Cancel,
        _ => return None,
    };
    Some(action)
}

/// A keyboard shortcut definition.
#[derive(Debug, Clone)]
pub struct Shortcut {
    pub key: &'static str,
    pub shift: bool,
    pub description: &'static str,
}

impl Shortcut {
    pub const fn new(key: &'static str, shift: bool, description: &'static str) -> Self {
        Self {
            key,
            shift,
            description,
        }
    }

    /// Format the shortcut for display (e.g., "Shift+B").
    pub fn format(&self) -> String {
        if self.shift {
            format!("Shift+{}", self.key)
        } else {
            self.key.to_string()
        }
    }
}

/// Registry of all keyboard shortcuts.
pub struct ShortcutRegistry;

impl ShortcutRegistry {
    pub fn all() -> Vec<Shortcut> {
        vec![
            Shortcut::new("O", false, "Draw points"),
            Shortcut::new("R", false, "Draw rectangles"),
            Shortcut::new("I", false, "Draw ellipses"),
            Shortcut::new("C", false, "Draw circles"),
            Shortcut::new("P", false, "Draw polygons"),
            Shortcut::new("L", false, "Draw lines"),
            Shortcut::new("B", false, "Paint with the brush"),
            Shortcut::new("B", true, "Next brush shape"),
            Shortcut::new("[", false, "Smaller brush"),
            Shortcut::new("]", false, "Larger brush"),
            Shortcut::new("Q", false, "Previous style group"),
            Shortcut::new("W", false, "Next style group"),
            Shortcut::new("Enter", false, "Finish polygon or line"),
            Shortcut::new("A", false, "Show or hide annotations"),
            Shortcut::new("Space", false, "New annotation"),
            Shortcut::new("Escape", false, "Cancel drawing"),
        ]
    }
}
