//! The loaded document (§3): the resolved object graph plus cross-reference
//! and encryption state needed to interpret it.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::encryption::{
    self, Aes128CryptFilter, Aes256CryptFilter, CryptFilter, EncryptionState, IdentityCryptFilter, Permissions,
    Rc4CryptFilter,
};
use crate::object::{resolve_direct, Dictionary, Object, MAX_INDIRECT_DEPTH};
use crate::object_id::ObjectId;
use crate::xref::Xref;
use crate::{Error, Result};

/// A loaded PDF document: every indirect object the reader could resolve,
/// plus the cross-reference and trailer information the parser used to
/// find them (§3, §4.D).
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub version: String,
    pub max_id: i64,
    pub binary_mark: Vec<u8>,
    pub xref_start: usize,
    pub trailer: Dictionary,
    pub reference_table: Xref,
    pub objects: BTreeMap<ObjectId, Object>,
    pub encryption_state: Option<EncryptionState>,
}

impl Document {
    pub fn new() -> Self {
        Document::default()
    }

    /// Whether the trailer names an `/Encrypt` dictionary (§4.F).
    pub fn is_encrypted(&self) -> bool {
        self.trailer.get(b"Encrypt").is_ok()
    }

    /// The `/Encrypt` dictionary, resolved if it is an indirect reference.
    pub fn get_encrypted(&self) -> Result<&Dictionary> {
        let encrypt = self.trailer.get(b"Encrypt")?;
        match encrypt {
            Object::Dictionary(dict) => Ok(dict),
            Object::Reference(id) => self.objects.get(id).ok_or(Error::MissingXrefEntry)?.as_dict(),
            _ => self.trailer.get(b"Encrypt").and_then(Object::as_dict),
        }
    }

    /// Builds the `/CF` crypt-filter table (§4.F), keyed by name, for V≥4
    /// Encrypt dictionaries. Returns an empty map for V<4, where `/CF` does
    /// not apply and every stream/string uses the implicit `V2`/RC4 filter.
    pub fn get_crypt_filters(&self) -> BTreeMap<Vec<u8>, Arc<dyn CryptFilter>> {
        let mut filters: BTreeMap<Vec<u8>, Arc<dyn CryptFilter>> = BTreeMap::new();

        let Ok(encrypt) = self.get_encrypted() else {
            return filters;
        };
        let Ok(cf) = encrypt.get(b"CF").and_then(Object::as_dict) else {
            return filters;
        };

        for (name, entry) in cf.iter() {
            let Ok(entry_dict) = entry.as_dict() else { continue };
            let cfm = entry_dict.get(b"CFM").and_then(Object::as_name).unwrap_or(b"None");
            let filter: Arc<dyn CryptFilter> = match cfm {
                b"V2" => Arc::new(Rc4CryptFilter),
                b"AESV2" => Arc::new(Aes128CryptFilter),
                b"AESV3" => Arc::new(Aes256CryptFilter),
                b"None" => Arc::new(IdentityCryptFilter),
                other => {
                    log::warn!("unsupported crypt filter method {:?} in /CF /{}", other, String::from_utf8_lossy(name));
                    continue;
                }
            };
            filters.insert(name.clone(), filter);
        }

        // The Identity filter always exists, even if a stream's own
        // /Filter /Crypt /Name points at it and it's absent from /CF.
        filters.entry(b"Identity".to_vec()).or_insert_with(|| Arc::new(IdentityCryptFilter));

        filters
    }

    /// Authenticates `password` as either the user or owner password
    /// (Algorithms 6/7 for R≤4, Algorithm 2.A for R5/6).
    pub fn authenticate_password(&self, password: &str) -> Result<()> {
        let algorithm = encryption::PasswordAlgorithm::try_from(self)?;
        algorithm.authenticate_user_password(self, password).map_err(Error::Decryption)
    }

    /// Checks whether `password` grants access, and if so, which
    /// permissions it carries (§4.F, "Access-rights check"). The owner
    /// password always grants every permission bit; the user password
    /// grants exactly the bits encoded in `/P`. An incorrect password
    /// grants none. If the document is not encrypted at all, access is
    /// unconditionally granted with every permission bit set.
    pub fn check_access_rights(&self, password: &str) -> (bool, Permissions) {
        if !self.is_encrypted() {
            return (true, Permissions::all());
        }
        let Ok(algorithm) = encryption::PasswordAlgorithm::try_from(self) else {
            return (false, Permissions::empty());
        };
        algorithm.check_access_rights(self, password)
    }

    /// Looks up an already-loaded indirect object by id.
    pub fn get_object(&self, id: ObjectId) -> Result<Object> {
        self.objects.get(&id).cloned().ok_or(Error::MissingXrefEntry)
    }

    pub fn get_object_mut(&mut self, id: ObjectId) -> Result<&mut Object> {
        self.objects.get_mut(&id).ok_or(Error::MissingXrefEntry)
    }

    /// Follows `object` through any chain of `Reference`s to its direct
    /// value, returning the last id in the chain (or `(0, 0)` if `object`
    /// was never a reference to begin with).
    pub fn dereference(&self, object: &Object) -> Result<(ObjectId, Object)> {
        let mut current = object.clone();
        let mut last_id = None;
        for _ in 0..MAX_INDIRECT_DEPTH {
            match current {
                Object::Reference(id) => {
                    last_id = Some(id);
                    current = self.get_object(id)?;
                }
                Object::IndirectObject(id, inner) => {
                    last_id = Some(id);
                    current = resolve_direct(&inner);
                }
                _ => break,
            }
        }
        Ok((last_id.unwrap_or((0, 0)), current))
    }

    /// All object numbers currently loaded.
    pub fn object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.objects.keys().map(|id| id.0)
    }

    /// Diagnostic walk (§4.D) tallying how many loaded objects carry each
    /// `/Type` and `/Subtype` name. Not on any hot path; for inspecting an
    /// unfamiliar document from a REPL or test.
    pub fn inspect(&self) -> BTreeMap<String, usize> {
        let mut tally = BTreeMap::new();
        for object in self.objects.values() {
            let Ok(dict) = object.as_dict() else { continue };
            for key in [b"Type".as_slice(), b"Subtype".as_slice()] {
                if let Ok(name) = dict.get(key).and_then(Object::as_name) {
                    *tally.entry(String::from_utf8_lossy(name).into_owned()).or_insert(0) += 1;
                }
            }
        }
        tally
    }
}
