//! Dev data scripts: a Lua script streams fx data into a binary and declares the
//! matching address constants.

use std::cell::RefCell;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use arduboy_fx::{DevDataWriter, FxOffsets};
use mlua::{ExternalResult, Lua};
use tracing::{debug, info};

use crate::error::Error;
use crate::script::helpers;

type Shared = Rc<RefCell<Option<DevDataWriter<Vec<u8>, Vec<u8>>>>>;

fn with_writer<T>(
    writer: &Shared,
    f: impl FnOnce(&mut DevDataWriter<Vec<u8>, Vec<u8>>) -> Result<T, arduboy_fx::Error>,
) -> mlua::Result<T> {
    let mut writer = writer.borrow_mut();
    let Some(writer) = writer.as_mut() else {
        return Err(mlua::Error::RuntimeError("fx data is already finalized".into()));
    };
    f(writer).into_lua_err()
}

fn resolve(directory: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if directory.as_os_str().is_empty() || path.is_absolute() {
        path.to_path_buf()
    } else {
        directory.join(path)
    }
}

fn register(lua: &Lua, writer: &Shared, directory: PathBuf) -> mlua::Result<()> {
    helpers::register(lua)?;
    let globals = lua.globals();

    let w = writer.clone();
    globals.set(
        "header",
        lua.create_function(move |_, (text, newlines): (String, Option<usize>)| {
            with_writer(&w, |d| d.write_header(&text, newlines.unwrap_or(0)))
        })?,
    )?;

    let w = writer.clone();
    globals.set(
        "preamble",
        lua.create_function(move |_, ()| with_writer(&w, |d| d.preamble()))?,
    )?;

    let w = writer.clone();
    globals.set(
        "field",
        lua.create_function(move |_, name: String| with_writer(&w, |d| d.field(&name)))?,
    )?;

    let w = writer.clone();
    globals.set(
        "write",
        lua.create_function(move |_, data: mlua::String| {
            with_writer(&w, |d| d.write(&data.as_bytes()))
        })?,
    )?;

    let w = writer.clone();
    globals.set(
        "pad",
        lua.create_function(move |_, (alignment, increase): (usize, Option<bool>)| {
            with_writer(&w, |d| d.pad(alignment, increase.unwrap_or(false)))
        })?,
    )?;

    let w = writer.clone();
    globals.set(
        "begin_save",
        lua.create_function(move |_, ()| with_writer(&w, |d| d.begin_save()))?,
    )?;

    globals.set(
        "file",
        lua.create_function(move |lua, path: String| {
            let path = resolve(&directory, &path);
            let data = fs::read(&path).into_lua_err()?;
            debug!("loaded {} bytes from {}", data.len(), path.display());
            lua.create_string(&data)
        })?,
    )?;

    Ok(())
}

/// Run an fx data script, writing the C++ header to `header` and the dev binary to `bin`.
///
/// The header preamble is only written when the script calls `preamble()`. `file(path)`
/// resolves relative paths against `directory`.
pub fn run_fxdata_script<H: Write, B: Write, P: Into<PathBuf>>(
    script: &str,
    mut header: H,
    mut bin: B,
    directory: P,
) -> Result<FxOffsets, Error> {
    let writer: Shared = Rc::new(RefCell::new(Some(DevDataWriter::new(Vec::new(), Vec::new()))));

    let lua = Lua::new();
    register(&lua, &writer, directory.into())?;
    lua.load(script).set_name("fxdata").exec()?;
    drop(lua);

    let Some(dev) = writer.borrow_mut().take() else {
        return Err(Error::Script(mlua::Error::RuntimeError(
            "fx data writer went missing".into(),
        )));
    };
    let (offsets, header_text, binary) = dev.finalize()?;
    header.write_all(&header_text)?;
    bin.write_all(&binary)?;
    header.flush()?;
    bin.flush()?;
    info!(
        "generated fx data: {} data bytes, {} save bytes",
        offsets.data_length, offsets.save_length
    );
    Ok(offsets)
}
