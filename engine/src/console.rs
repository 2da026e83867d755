//! The engine's only window onto the terminal.

/// User-facing output and line input.
///
/// Implementations decide styling; the engine only picks the kind of message.
pub trait Console {
    /// System notice.
    fn notice(&mut self, text: &str);

    /// Error, shown with an `Error:` prefix.
    fn error(&mut self, text: &str);

    /// Model reply attributed to `name`.
    fn agent(&mut self, name: &str, text: &str);

    /// Unstyled line (diffs, listings, command output).
    fn raw(&mut self, text: &str);

    /// Read one line after showing `prompt`.
    ///
    /// `None` means end of input or interrupt.
    fn prompt(&mut self, prompt: &str) -> Option<String>;

    /// Clear the screen. A no-op where that makes no sense.
    fn clear(&mut self) {}
}
