use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const BOOTSTRAP_CLASS: &str = "io.frida.FridaApplication";
pub const GADGET_LOAD_NAME: &str = "frida-gadget";

/// `android.app.Application` subclass that loads the gadget before handing
/// control back to the framework.
pub const BOOTSTRAP_SMALI: &str = r#".class public Lio/frida/FridaApplication;
.super Landroid/app/Application;
.source "FridaApplication.java"


# direct methods
.method public constructor <init>()V
    .locals 0

    .line 1
    invoke-direct {p0}, Landroid/app/Application;-><init>()V

    return-void
.end method


# virtual methods
.method public attachBaseContext(Landroid/content/Context;)V
    .locals 1
    .param p1, "base"    # Landroid/content/Context;

    .line 5
    const-string v0, "frida-gadget"

    invoke-static {v0}, Ljava/lang/System;->loadLibrary(Ljava/lang/String;)V

    .line 6
    invoke-super {p0, p1}, Landroid/app/Application;->attachBaseContext(Landroid/content/Context;)V

    .line 7
    return-void
.end method
"#;

/// Path of the class file relative to a smali root.
pub fn smali_relative_path() -> PathBuf {
    let mut path: PathBuf = BOOTSTRAP_CLASS.split('.').collect();
    path.set_extension("smali");
    path
}

/// Writes the bootstrap class under `smali_root`, replacing any previous
/// copy.
pub fn write_bootstrap(smali_root: &Path) -> Result<PathBuf> {
    let dest = smali_root.join(smali_relative_path());
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&dest, BOOTSTRAP_SMALI)?;
    info!("wrote bootstrap class {}", dest.display());
    Ok(dest)
}
