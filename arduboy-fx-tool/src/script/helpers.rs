//! Helper functions shared by every script runtime: decoding, number packing, directory
//! listings and tile resizing.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use arduboy_fx::title::resize_paletted;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use mlua::{ExternalResult, Lua, Table, Value};
use strum::{Display, EnumString};
use tracing::debug;

use crate::hex::hex_to_bin;

/// Element types understood by `bytes(table, type)`. All are little endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum NumberKind {
    Float64,
    Float32,
    Int32,
    Uint32,
    /// Three bytes, the top byte of a `u32` dropped.
    Uint24,
    Int16,
    Uint16,
    Int8,
    Uint8,
    #[strum(serialize = "byte", serialize = "")]
    Byte,
}

impl NumberKind {
    /// Append `value` in this representation. Integer kinds truncate toward zero and wrap.
    pub fn encode(self, value: f64, out: &mut Vec<u8>) {
        let int = value as i64;
        match self {
            NumberKind::Float64 => out.extend_from_slice(&value.to_le_bytes()),
            NumberKind::Float32 => out.extend_from_slice(&(value as f32).to_le_bytes()),
            NumberKind::Int32 => out.extend_from_slice(&(int as i32).to_le_bytes()),
            NumberKind::Uint32 => out.extend_from_slice(&(int as u32).to_le_bytes()),
            NumberKind::Uint24 => out.extend_from_slice(&(int as u32).to_le_bytes()[..3]),
            NumberKind::Int16 => out.extend_from_slice(&(int as i16).to_le_bytes()),
            NumberKind::Uint16 => out.extend_from_slice(&(int as u16).to_le_bytes()),
            NumberKind::Int8 => out.push(int as i8 as u8),
            NumberKind::Uint8 | NumberKind::Byte => out.push(int as u8),
        }
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    /// Absolute path of the entry.
    pub path: PathBuf,
    pub is_directory: bool,
}

/// Entries of `path`, sorted by name.
pub fn list_dir<P: AsRef<Path>>(path: P) -> io::Result<Vec<DirEntryInfo>> {
    let mut result = Vec::new();
    for entry in fs::read_dir(&path)? {
        let entry = entry?;
        result.push(DirEntryInfo {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: std::path::absolute(entry.path())?,
            is_directory: entry.file_type()?.is_dir(),
        });
    }
    result.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(result)
}

/// Convert decoded JSON (or TOML, which decodes to the same model) into a Lua value.
/// `null` becomes `nil`.
pub fn json_to_lua(lua: &Lua, value: &serde_json::Value) -> mlua::Result<Value> {
    use serde_json::Value as Json;
    Ok(match value {
        Json::Null => Value::Nil,
        Json::Bool(b) => Value::Boolean(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::String(lua.create_string(s)?),
        Json::Array(items) => {
            let table = lua.create_table_with_capacity(items.len(), 0)?;
            for (i, item) in items.iter().enumerate() {
                table.raw_set(i + 1, json_to_lua(lua, item)?)?;
            }
            Value::Table(table)
        }
        Json::Object(map) => {
            let table = lua.create_table_with_capacity(0, map.len())?;
            for (key, item) in map {
                table.raw_set(key.as_str(), json_to_lua(lua, item)?)?;
            }
            Value::Table(table)
        }
    })
}

fn number(value: &Value, index: usize) -> mlua::Result<f64> {
    match value {
        Value::Integer(i) => Ok(*i as f64),
        Value::Number(n) => Ok(*n),
        _ => Err(mlua::Error::RuntimeError(format!(
            "index {} must be a number",
            index
        ))),
    }
}

/// Register `hex`, `hex2bin`, `base64`, `json`, `toml`, `bytes`, `listdir` and
/// `image_resize` as globals.
pub fn register(lua: &Lua) -> mlua::Result<()> {
    let globals = lua.globals();

    globals.set(
        "hex",
        lua.create_function(|lua, text: mlua::String| {
            let data = hex::decode(&*text.as_bytes()).into_lua_err()?;
            debug!("decoded {} bytes from hex in script", data.len());
            lua.create_string(&data)
        })?,
    )?;

    globals.set(
        "hex2bin",
        lua.create_function(|lua, text: mlua::String| {
            let data = hex_to_bin(&text.to_string_lossy()).into_lua_err()?;
            lua.create_string(&data)
        })?,
    )?;

    globals.set(
        "base64",
        lua.create_function(|lua, text: mlua::String| {
            let data = STANDARD.decode(&*text.as_bytes()).into_lua_err()?;
            debug!("decoded {} bytes from base64 in script", data.len());
            lua.create_string(&data)
        })?,
    )?;

    globals.set(
        "json",
        lua.create_function(|lua, text: mlua::String| {
            let value: serde_json::Value = serde_json::from_slice(&text.as_bytes()).into_lua_err()?;
            json_to_lua(lua, &value)
        })?,
    )?;

    globals.set(
        "toml",
        lua.create_function(|lua, text: mlua::String| {
            let value: serde_json::Value = toml::from_str(&text.to_string_lossy()).into_lua_err()?;
            json_to_lua(lua, &value)
        })?,
    )?;

    globals.set(
        "bytes",
        lua.create_function(|lua, (values, kind): (Table, Option<String>)| {
            let kind = kind.unwrap_or_default();
            let kind: NumberKind = kind
                .parse()
                .map_err(|_| mlua::Error::RuntimeError(format!("unknown type: {}", kind)))?;
            let mut out = Vec::new();
            for (i, value) in values.sequence_values::<Value>().enumerate() {
                kind.encode(number(&value?, i + 1)?, &mut out);
            }
            debug!("encoded {} bytes as {} in script", out.len(), kind);
            lua.create_string(&out)
        })?,
    )?;

    globals.set(
        "listdir",
        lua.create_function(|lua, path: String| {
            let result = lua.create_table()?;
            for (i, entry) in list_dir(&path).into_lua_err()?.into_iter().enumerate() {
                let info = lua.create_table()?;
                info.set("name", entry.name)?;
                info.set("path", entry.path.to_string_lossy().into_owned())?;
                info.set("is_directory", entry.is_directory)?;
                result.raw_set(i + 1, info)?;
            }
            Ok(result)
        })?,
    )?;

    globals.set(
        "image_resize",
        lua.create_function(
            |lua, (tiles, width, height, new_width, new_height): (Table, usize, usize, usize, usize)| {
                let result = lua.create_table()?;
                for (i, tile) in tiles.sequence_values::<Value>().enumerate() {
                    let Value::String(tile) = tile? else {
                        return Err(mlua::Error::RuntimeError(format!(
                            "expected raw tile data at index {}",
                            i + 1
                        )));
                    };
                    let resized =
                        resize_paletted(&tile.as_bytes(), width, height, new_width, new_height)
                            .into_lua_err()?;
                    result.raw_set(i + 1, lua.create_string(&resized)?)?;
                }
                Ok(result)
            },
        )?,
    )?;

    Ok(())
}
