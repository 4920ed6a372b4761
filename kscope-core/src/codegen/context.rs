use std::rc::Rc;

struct Binding<S> {
    name: String,
    slot: S,
    next: Option<Rc<Binding<S>>>,
}

/// Variables visible at some point of a function body.
///
/// Binding returns a new context sharing the old one as its tail, so the
/// enclosing scope is untouched and shadowed names come back on scope exit.
pub struct Context<S> {
    head: Option<Rc<Binding<S>>>,
}

impl<S> Clone for Context<S> {
    fn clone(&self) -> Self {
        Self { head: self.head.clone() }
    }
}

impl<S> Default for Context<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Context<S> {
    pub fn new() -> Self {
        Self { head: None }
    }

    pub fn bind(&self, name: &str, slot: S) -> Self {
        Self {
            head: Some(Rc::new(Binding {
                name: name.to_string(),
                slot,
                next: self.head.clone(),
            })),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Innermost binding of `name`.
    pub fn lookup(&self, name: &str) -> Option<&S> {
        let mut current = self.head.as_deref();

        while let Some(binding) = current {
            if binding.name == name {
                return Some(&binding.slot);
            }

            current = binding.next.as_deref();
        }

        None
    }
}

impl<S> std::fmt::Debug for Context<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = vec![];
        let mut current = self.head.as_deref();

        while let Some(binding) = current {
            names.push(binding.name.as_str());
            current = binding.next.as_deref();
        }

        f.debug_tuple("Context").field(&names).finish()
    }
}
