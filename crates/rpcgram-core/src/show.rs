/// Compact, human-oriented display. Unlike [`std::fmt::Debug`], `show`
/// elides all structure: a symbol shows as itself and a word as the
/// concatenation of its symbols, which keeps trace output and dot labels
/// readable.
pub trait Show {
    /// Returns the compact display representation of `self`.
    fn show(&self) -> String;
}

impl Show for char {
    fn show(&self) -> String {
        self.to_string()
    }
}

impl Show for u8 {
    fn show(&self) -> String {
        self.to_string()
    }
}

impl Show for usize {
    fn show(&self) -> String {
        self.to_string()
    }
}

impl<T: Show> Show for &T {
    fn show(&self) -> String {
        T::show(self)
    }
}

impl<T: Show> Show for [T] {
    fn show(&self) -> String {
        self.iter().map(Show::show).collect()
    }
}
