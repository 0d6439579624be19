//! Attribute modifications handed to a storage backend.

use std::slice;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modify {
    // Replace every value of this attribute with these.
    Replace(String, Vec<Vec<u8>>),
}

impl Modify {
    pub fn attr(&self) -> &str {
        match self {
            Modify::Replace(a, _) => a.as_str(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifyList {
    // The order of this list matters. Each change must be done in order.
    mods: Vec<Modify>,
}

impl ModifyList {
    pub fn new_replace(attr: &str, values: Vec<Vec<u8>>) -> Self {
        ModifyList {
            mods: vec![Modify::Replace(attr.to_string(), values)],
        }
    }

    pub fn iter(&self) -> slice::Iter<'_, Modify> {
        self.mods.iter()
    }

    pub fn len(&self) -> usize {
        self.mods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }
}
