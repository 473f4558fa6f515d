use crate::target::Target;

pub mod arxiv;
pub mod scholar;

/// A remote index that can enumerate papers citing a target.
pub trait Source {
    /// Raw, source-specific record shape.
    type Record;

    fn name(&self) -> &'static str;

    /// Fetch every citing record the source can offer. An unreachable or
    /// misbehaving source yields what it got so far, possibly nothing.
    fn fetch(&self, target: &Target) -> Vec<Self::Record>;
}
