#![allow(dead_code)]

use apkrig::{Fetch, Invocation, PipelineConfig, PipelineError, Result, ToolOutput, ToolRunner};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use zip::write::SimpleFileOptions;

pub const SAMPLE_MANIFEST: &str = r#"<?xml version="1.0" encoding="utf-8" standalone="no"?>
<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="com.oddno.lovelive">
    <application android:label="@string/app_name" android:extractNativeLibs="true">
        <activity android:name="com.unity3d.player.UnityPlayerActivity"/>
    </application>
</manifest>
"#;

pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, data) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    File::create(path)
        .unwrap()
        .write_all(&zip_bytes(entries))
        .unwrap();
}

/// A main package plus its arm64 split, the way a bundle ships them.
pub fn write_package_set(dir: &Path) -> PathBuf {
    let main = dir.join("com.oddno.lovelive.apk");
    write_zip(
        &main,
        &[
            ("AndroidManifest.xml", SAMPLE_MANIFEST.as_bytes()),
            ("classes.dex", b"dex\n035"),
            (
                "assets/bin/Data/Managed/Metadata/global-metadata.dat",
                b"\xaf\x1b\xb1\xfametadata",
            ),
        ],
    );
    write_zip(
        &dir.join("config.arm64_v8a.apk"),
        &[("lib/arm64-v8a/libil2cpp.so", b"\x7fELFlibrary")],
    );
    main
}

/// Canned HTTP: known URLs get their bytes, anything else a placeholder.
#[derive(Clone, Default)]
pub struct FakeFetch {
    pub bodies: HashMap<String, Vec<u8>>,
    pub requested: Rc<RefCell<Vec<String>>>,
}

impl FakeFetch {
    pub fn with(mut self, url: &str, body: Vec<u8>) -> Self {
        self.bodies.insert(url.to_string(), body);
        self
    }
}

impl Fetch for FakeFetch {
    fn fetch(&self, url: &str, dest: &Path) -> Result<PathBuf> {
        self.requested.borrow_mut().push(url.to_string());
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let body = self
            .bodies
            .get(url)
            .cloned()
            .unwrap_or_else(|| b"payload".to_vec());
        fs::write(dest, body)?;
        Ok(dest.to_path_buf())
    }
}

/// Stands in for every external executable the pipeline drives.
#[derive(Clone)]
pub struct Workbench {
    pub decode_failures: usize,
    pub build_fails: bool,
    pub missing: Vec<&'static str>,
    pub seen: Rc<RefCell<Vec<Invocation>>>,
    pub(crate) decodes: Rc<RefCell<usize>>,
}

impl Default for Workbench {
    fn default() -> Self {
        Self {
            decode_failures: 0,
            build_fails: false,
            missing: Vec::new(),
            seen: Rc::new(RefCell::new(Vec::new())),
            decodes: Rc::new(RefCell::new(0)),
        }
    }
}

impl Workbench {
    pub fn tools_called(&self) -> Vec<String> {
        self.seen.borrow().iter().map(|i| i.tool_name()).collect()
    }

    pub fn calls_to(&self, tool: &str) -> Vec<Invocation> {
        self.seen
            .borrow()
            .iter()
            .filter(|i| i.tool_name() == tool)
            .cloned()
            .collect()
    }
}

fn arg_after(inv: &Invocation, flag: &str) -> PathBuf {
    let i = inv.args.iter().position(|a| a == flag).unwrap();
    PathBuf::from(&inv.args[i + 1])
}

impl ToolRunner for Workbench {
    fn run(&self, inv: &Invocation) -> Result<ToolOutput> {
        self.seen.borrow_mut().push(inv.clone());
        let tool = inv.tool_name();
        if self.missing.contains(&tool.as_str()) {
            return Err(PipelineError::ToolNotFound(tool));
        }

        match tool.as_str() {
            "apktool" | "apktool.bat" if inv.args[0] == "d" => {
                let mut decodes = self.decodes.borrow_mut();
                *decodes += 1;
                if *decodes <= self.decode_failures {
                    return Ok(ToolOutput::failed(1, "brut.androlib.AndrolibException"));
                }
                let out = arg_after(inv, "-o");
                fs::create_dir_all(out.join("smali"))?;
                fs::write(out.join("AndroidManifest.xml"), SAMPLE_MANIFEST)?;
            }
            "apktool" | "apktool.bat" => {
                if self.build_fails {
                    return Ok(ToolOutput::failed(1, "aapt2 link failed"));
                }
                fs::write(arg_after(inv, "-o"), b"rebuilt")?;
            }
            "xz" => {
                let src = PathBuf::from(inv.args.last().unwrap());
                fs::write(src.with_extension(""), b"\x7fELFgadget")?;
                fs::remove_file(&src)?;
            }
            "keytool" => fs::write(arg_after(inv, "-keystore"), b"keystore")?,
            "apksigner" => fs::write(arg_after(inv, "--out"), b"signed")?,
            "jarsigner" => {}
            _ if tool.starts_with("Il2CppDumper") => {
                let out = PathBuf::from(&inv.args[2]);
                fs::create_dir_all(out.join("script"))?;
                fs::write(out.join("script/dump.cs"), b"// Image 0: mscorlib.dll")?;
                return Ok(ToolOutput {
                    status: Some(0),
                    stdout: "Done!".to_string(),
                    stderr: String::new(),
                });
            }
            _ => return Err(PipelineError::ToolNotFound(tool)),
        }
        Ok(ToolOutput::ok())
    }
}

pub fn config_in(root: &Path) -> PipelineConfig {
    PipelineConfig::with_root(root)
}
