//! The identifier table.
//!
//! Identifiers are case-insensitive in the source language, so names are
//! folded to lower case when interned. Two lookups of equal (folded) strings
//! return the same `NameId`, which makes name equality a handle comparison.
//!
//! Every interned name carries a mutable front-end token: the most recent
//! visible declaration for that name. The analyzer uses the slot as its
//! fast in-scope lookup and is responsible for saving and restoring it
//! around declaration contexts.

use std::collections::HashMap;

use crate::arena::ArenaId;
use crate::decl::DeclId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NameId(u32);

impl ArenaId for NameId {
    fn from_raw(raw: u32) -> Self {
        NameId(raw)
    }
    fn raw(self) -> u32 {
        self.0
    }
}

#[derive(Debug)]
struct IdentInfo {
    text: String,
    front_token: Option<DeclId>,
}

#[derive(Debug, Default)]
pub struct IdentTable {
    map: HashMap<String, NameId>,
    infos: Vec<IdentInfo>,
}

impl IdentTable {
    pub fn new() -> IdentTable {
        IdentTable::default()
    }

    /// Interns a name, folding it to lower case first.
    pub fn intern(&mut self, text: &str) -> NameId {
        let folded = text.to_ascii_lowercase();
        if let Some(&id) = self.map.get(&folded) {
            return id;
        }
        let id = NameId(self.infos.len() as u32);
        self.map.insert(folded.clone(), id);
        self.infos.push(IdentInfo {
            text: folded,
            front_token: None,
        });
        id
    }

    pub fn text(&self, id: NameId) -> &str {
        &self.infos[id.0 as usize].text
    }

    /// First letter of the name, used by the implicit typing rules.
    pub fn first_letter(&self, id: NameId) -> Option<char> {
        self.text(id).chars().next()
    }

    pub fn front_token(&self, id: NameId) -> Option<DeclId> {
        self.infos[id.0 as usize].front_token
    }

    pub fn set_front_token(&mut self, id: NameId, decl: Option<DeclId>) {
        self.infos[id.0 as usize].front_token = decl;
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}
