pub(crate) mod document;
pub(crate) mod ids;
pub(crate) mod ordering;
