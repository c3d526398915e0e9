//! Flashcart scripts: read existing containers, build new ones from slots, packages and
//! title images.

use std::cell::RefCell;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use arduboy_fx::scan::{FileSource, SlotLocation, walk};
use arduboy_fx::title::{DEFAULT_WHITE_THRESHOLD, image_to_title};
use arduboy_fx::{FLASH_PAGE_SIZE, FX_PAGE_SIZE, FlashcartWriter, HEADER_IMAGE_LENGTH, SlotHeader};
use mlua::{ExternalResult, Lua, Table, Value, Variadic};
use tracing::{debug, error, info};

use crate::error::Error;
use crate::package::{BinarySelection, read_package};
use crate::script::helpers;
use crate::script::slot::ScriptSlot;

type Reader = Rc<RefCell<FileSource<BufReader<File>>>>;
type Writer = Rc<RefCell<Option<FlashcartWriter<BufWriter<File>>>>>;

/// Everything a running flashcart script can touch.
///
/// Relative paths in the script resolve against the session directory. Flashcarts opened
/// by the script stay open until [`ScriptSession::close_all`], which also writes the
/// terminating page of every new flashcart.
pub struct ScriptSession {
    directory: PathBuf,
    arguments: Vec<String>,
    readers: RefCell<Vec<Reader>>,
    writers: RefCell<Vec<Writer>>,
    output: RefCell<String>,
}

/// Where the payloads of a stored program live, as (address, length) pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Payload {
    sketch: (usize, usize),
    fx_data: (usize, usize),
    fx_save: (usize, usize),
}

impl Payload {
    fn locate(header: &SlotHeader, location: SlotLocation) -> Self {
        let data_start = header.data_start as usize * FX_PAGE_SIZE;
        let save_start = header.save_start as usize * FX_PAGE_SIZE;
        Self {
            sketch: (
                header.program_start as usize * FX_PAGE_SIZE,
                header.program_pages as usize * FLASH_PAGE_SIZE,
            ),
            fx_data: if header.has_fx_data() {
                (data_start, header.data_pages as usize * FX_PAGE_SIZE)
            } else {
                (data_start, 0)
            },
            fx_save: if header.has_fx_save() {
                (save_start, location.address + header.slot_bytes() - save_start)
            } else {
                (save_start, 0)
            },
        }
    }
}

fn read_range(source: &Reader, (address, length): (usize, usize)) -> Result<Vec<u8>, Error> {
    let mut data = vec![0u8; length];
    if length > 0 {
        source.borrow_mut().read_at(address, &mut data)?;
    }
    Ok(data)
}

/// Load sketch, fx data and fx save of a stored program into its script table.
fn pull_data(lua: &Lua, slot: &Table, source: &Reader, payload: Option<Payload>) -> mlua::Result<()> {
    let Some(payload) = payload else {
        debug!("tried to pull data for a category, ignoring");
        return Ok(());
    };
    for (key, range) in [
        ("sketch", payload.sketch),
        ("fxdata", payload.fx_data),
        ("fxsave", payload.fx_save),
    ] {
        let data = read_range(source, range).into_lua_err()?;
        slot.set(key, lua.create_string(&data)?)?;
    }
    Ok(())
}

fn threshold(value: Option<i64>) -> u8 {
    match value {
        Some(t) if t > 0 => t.min(u8::MAX as i64) as u8,
        _ => DEFAULT_WHITE_THRESHOLD,
    }
}

impl ScriptSession {
    pub fn new<P: Into<PathBuf>>(arguments: Vec<String>, directory: P) -> Self {
        Self {
            directory: directory.into(),
            arguments,
            readers: RefCell::new(Vec::new()),
            writers: RefCell::new(Vec::new()),
            output: RefCell::new(String::new()),
        }
    }

    /// Resolve a path given by the script.
    pub fn file_path<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        let path = path.as_ref();
        if self.directory.as_os_str().is_empty() || path.is_absolute() {
            path.to_path_buf()
        } else {
            self.directory.join(path)
        }
    }

    /// Finish every flashcart the script created and drop open readers. Returns the
    /// errors of writers that couldn't be finished.
    pub fn close_all(&self) -> Vec<Error> {
        self.readers.borrow_mut().clear();
        let mut errors = Vec::new();
        for writer in self.writers.borrow_mut().drain(..) {
            let Some(writer) = writer.borrow_mut().take() else {
                continue;
            };
            info!("closing flashcart writer after {} slots", writer.slots());
            if let Err(e) = writer.finish() {
                error!("couldn't finish flashcart: {}", e);
                errors.push(e.into());
            }
        }
        errors
    }

    /// Run `script` and return everything it logged.
    pub fn run(self: &Rc<Self>, script: &str) -> Result<String, Error> {
        let lua = Lua::new();
        let result = self
            .register(&lua)
            .and_then(|()| lua.load(script).set_name("flashcart").exec());
        let mut close_errors = self.close_all();
        result?;
        if !close_errors.is_empty() {
            return Err(close_errors.swap_remove(0));
        }
        Ok(self.output.take())
    }

    fn parse_flashcart(&self, lua: &Lua, path: &str, preload: bool) -> mlua::Result<Table> {
        let path = self.file_path(path);
        let file = File::open(&path).into_lua_err()?;
        let source: Reader = Rc::new(RefCell::new(FileSource::new(BufReader::new(file))));
        self.readers.borrow_mut().push(source.clone());

        let mut found = Vec::new();
        walk(&mut *source.borrow_mut(), |file, header, location| {
            if header.is_old_format() {
                return Err(arduboy_fx::Error::OldFormat(header.title.to_string()));
            }
            let mut image = vec![0u8; HEADER_IMAGE_LENGTH];
            file.read_at(location.address + FX_PAGE_SIZE, &mut image)?;
            found.push((header.clone(), location, image));
            Ok(())
        })
        .into_lua_err()?;
        info!("parsed {} slots from {}", found.len(), path.display());

        let result = lua.create_table_with_capacity(found.len(), 0)?;
        for (header, location, image) in found {
            let slot = lua.create_table()?;
            for (key, text) in [
                ("title", &header.title),
                ("version", &header.version),
                ("developer", &header.developer),
                ("info", &header.info),
            ] {
                slot.set(key, lua.create_string(text.as_bytes())?)?;
            }
            slot.set("was_category", header.is_category())?;
            slot.set("image", lua.create_string(&image)?)?;

            let payload = (!header.is_category()).then(|| Payload::locate(&header, location));
            let pull = {
                let slot = slot.clone();
                let source = source.clone();
                lua.create_function(move |lua, ()| pull_data(lua, &slot, &source, payload))?
            };
            slot.set("pull_data", pull)?;
            if preload {
                pull_data(lua, &slot, &source, payload)?;
            }
            result.raw_set(location.index + 1, slot)?;
        }
        Ok(result)
    }

    fn new_flashcart(&self, lua: &Lua, path: &str) -> mlua::Result<Table> {
        let path = self.file_path(path);
        info!("opening new flashcart: {}", path.display());
        let file = File::create(&path).into_lua_err()?;
        let writer: Writer = Rc::new(RefCell::new(Some(FlashcartWriter::new(BufWriter::new(file)))));
        self.writers.borrow_mut().push(writer.clone());

        let cart = lua.create_table()?;
        cart.set(
            "write_slot",
            lua.create_function(move |_, slot: Table| {
                let spec = ScriptSlot::from_table(&slot)?.into_spec();
                let mut writer = writer.borrow_mut();
                let Some(writer) = writer.as_mut() else {
                    return Err(mlua::Error::RuntimeError("flashcart is already closed".into()));
                };
                writer.write_slot(spec).into_lua_err()
            })?,
        )?;
        Ok(cart)
    }

    fn title_image(&self, path: &str, threshold: u8) -> Result<Vec<u8>, Error> {
        let encoded = fs::read(self.file_path(path))?;
        let raw = image_to_title(&encoded, threshold)?;
        info!("converted image '{}' to title", path);
        Ok(raw)
    }

    fn register(self: &Rc<Self>, lua: &Lua) -> mlua::Result<()> {
        helpers::register(lua)?;
        let globals = lua.globals();

        let session = Rc::clone(self);
        globals.set(
            "log",
            lua.create_function(move |lua, values: Variadic<Value>| {
                let mut parts = Vec::with_capacity(values.len());
                for (i, value) in values.iter().enumerate() {
                    let Some(text) = lua.coerce_string(value.clone())? else {
                        return Err(mlua::Error::RuntimeError(format!(
                            "bad argument #{} to log (string expected)",
                            i + 1
                        )));
                    };
                    parts.push(text.to_string_lossy());
                }
                let mut output = session.output.borrow_mut();
                output.push_str(&parts.join("\t"));
                output.push('\n');
                Ok(())
            })?,
        )?;

        globals.set(
            "is_category",
            lua.create_function(|_, slot: Table| Ok(ScriptSlot::from_table(&slot)?.is_category()))?,
        )?;
        globals.set(
            "has_fxsave",
            lua.create_function(|_, slot: Table| Ok(ScriptSlot::from_table(&slot)?.has_fx_save()))?,
        )?;

        let session = Rc::clone(self);
        globals.set(
            "parse_flashcart",
            lua.create_function(move |lua, (path, preload): (String, Option<bool>)| {
                session.parse_flashcart(lua, &path, preload.unwrap_or(false))
            })?,
        )?;

        let session = Rc::clone(self);
        globals.set(
            "new_flashcart",
            lua.create_function(move |lua, path: String| session.new_flashcart(lua, &path))?,
        )?;

        let session = Rc::clone(self);
        globals.set(
            "arguments",
            lua.create_function(move |_, ()| Ok(Variadic::from_iter(session.arguments.clone())))?,
        )?;

        // The threshold stays the sixth argument so older scripts keep working.
        let session = Rc::clone(self);
        globals.set(
            "title_image",
            lua.create_function(
                move |lua, (path, _, _, _, _, limit): (String, Value, Value, Value, Value, Option<i64>)| {
                    if path.is_empty() {
                        return Err(mlua::Error::RuntimeError(
                            "must provide filename for image".into(),
                        ));
                    }
                    let raw = session.title_image(&path, threshold(limit)).into_lua_err()?;
                    lua.create_string(&raw)
                },
            )?,
        )?;

        let session = Rc::clone(self);
        globals.set(
            "package",
            lua.create_function(
                move |lua, (path, device, exact, limit): (String, Option<String>, Option<String>, Option<i64>)| {
                    let selection = BinarySelection::Suitable {
                        device: device.as_deref().unwrap_or(""),
                        exact: exact.as_deref().unwrap_or(""),
                    };
                    let spec = read_package(session.file_path(&path), selection, threshold(limit))
                        .into_lua_err()?;
                    ScriptSlot::from_spec(spec).to_table(lua)
                },
            )?,
        )?;

        let session = Rc::clone(self);
        globals.set(
            "packageany",
            lua.create_function(
                move |lua, (path, devices, limit): (String, Option<String>, Option<i64>)| {
                    let devices: Vec<String> = devices
                        .unwrap_or_default()
                        .split(',')
                        .map(|d| d.trim().to_string())
                        .collect();
                    let selection = BinarySelection::Any(&devices);
                    let spec = read_package(session.file_path(&path), selection, threshold(limit))
                        .into_lua_err()?;
                    ScriptSlot::from_spec(spec).to_table(lua)
                },
            )?,
        )?;

        Ok(())
    }
}

/// Run a flashcart script with `arguments`, resolving relative paths against `directory`
/// (an empty directory means the process working directory). Returns the script's log.
pub fn run_flashcart_script<P: Into<PathBuf>>(
    script: &str,
    arguments: &[String],
    directory: P,
) -> Result<String, Error> {
    Rc::new(ScriptSession::new(arguments.to_vec(), directory)).run(script)
}
