//! The slot record scripts pass around, checked at the Lua boundary.

use arduboy_fx::{MetaString, SlotSpec};
use bitflags::bitflags;
use mlua::{Lua, Table, Value};

bitflags! {
    /// Which fields a slot table actually carried as strings.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SlotFields: u8 {
        const TITLE = 1 << 0;
        const IMAGE = 1 << 1;
        const SKETCH = 1 << 2;
        const FXDATA = 1 << 3;
        const FXSAVE = 1 << 4;
    }
}

/// A slot as seen by scripts. Fields of the wrong type are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptSlot {
    pub fields: SlotFields,
    pub title: MetaString,
    pub version: MetaString,
    pub developer: MetaString,
    pub info: MetaString,
    pub image: Vec<u8>,
    pub sketch: Vec<u8>,
    pub fx_data: Vec<u8>,
    pub fx_save: Vec<u8>,
    /// Set on slots read from an existing flashcart.
    pub was_category: Option<bool>,
}

fn pull_bytes(table: &Table, key: &str) -> mlua::Result<Option<Vec<u8>>> {
    match table.raw_get::<Value>(key)? {
        Value::String(s) => Ok(Some(s.as_bytes().to_vec())),
        _ => Ok(None),
    }
}

/// Metadata strings are raw bytes on both sides, so nothing is re-encoded here.
fn pull_meta(table: &Table, key: &str) -> mlua::Result<Option<MetaString>> {
    Ok(pull_bytes(table, key)?.map(MetaString::from))
}

impl ScriptSlot {
    pub fn from_table(table: &Table) -> mlua::Result<Self> {
        let mut slot = ScriptSlot::default();
        if let Some(title) = pull_meta(table, "title")? {
            slot.title = title;
            slot.fields |= SlotFields::TITLE;
        }
        slot.version = pull_meta(table, "version")?.unwrap_or_default();
        slot.developer = pull_meta(table, "developer")?.unwrap_or_default();
        slot.info = pull_meta(table, "info")?.unwrap_or_default();

        let binaries = [
            ("image", SlotFields::IMAGE, &mut slot.image),
            ("sketch", SlotFields::SKETCH, &mut slot.sketch),
            ("fxdata", SlotFields::FXDATA, &mut slot.fx_data),
            ("fxsave", SlotFields::FXSAVE, &mut slot.fx_save),
        ];
        for (key, flag, target) in binaries {
            if let Some(data) = pull_bytes(table, key)? {
                *target = data;
                slot.fields |= flag;
            }
        }

        if let Value::Boolean(b) = table.raw_get::<Value>("was_category")? {
            slot.was_category = Some(b);
        }
        Ok(slot)
    }

    /// Record for a slot built on the Rust side. Empty binaries count as absent.
    pub fn from_spec(spec: SlotSpec) -> Self {
        let mut fields = SlotFields::TITLE;
        fields.set(SlotFields::IMAGE, !spec.image.is_empty());
        fields.set(SlotFields::SKETCH, !spec.sketch.is_empty());
        fields.set(SlotFields::FXDATA, !spec.fx_data.is_empty());
        fields.set(SlotFields::FXSAVE, !spec.fx_save.is_empty());
        Self {
            fields,
            title: spec.title,
            version: spec.version,
            developer: spec.developer,
            info: spec.info,
            image: spec.image,
            sketch: spec.sketch,
            fx_data: spec.fx_data,
            fx_save: spec.fx_save,
            was_category: None,
        }
    }

    /// A slot without a sketch is a category, unless it was read from a flashcart as a
    /// program.
    pub fn is_category(&self) -> bool {
        if !self.sketch.is_empty() {
            return false;
        }
        self.was_category.unwrap_or(true)
    }

    pub fn has_fx_save(&self) -> bool {
        !self.fx_save.is_empty()
    }

    pub fn into_spec(self) -> SlotSpec {
        SlotSpec {
            title: self.title,
            version: self.version,
            developer: self.developer,
            info: self.info,
            image: self.image,
            sketch: self.sketch,
            fx_data: self.fx_data,
            fx_save: self.fx_save,
        }
    }

    /// Build the script table. Only fields that are present are set.
    pub fn to_table(&self, lua: &Lua) -> mlua::Result<Table> {
        let table = lua.create_table()?;
        for (key, text) in [
            ("title", &self.title),
            ("version", &self.version),
            ("developer", &self.developer),
            ("info", &self.info),
        ] {
            table.set(key, lua.create_string(text.as_bytes())?)?;
        }

        let binaries = [
            ("image", SlotFields::IMAGE, &self.image),
            ("sketch", SlotFields::SKETCH, &self.sketch),
            ("fxdata", SlotFields::FXDATA, &self.fx_data),
            ("fxsave", SlotFields::FXSAVE, &self.fx_save),
        ];
        for (key, flag, data) in binaries {
            if self.fields.contains(flag) {
                table.set(key, lua.create_string(data)?)?;
            }
        }
        if let Some(was_category) = self.was_category {
            table.set("was_category", was_category)?;
        }
        Ok(table)
    }
}
