use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const LIBRARY_NAME: &str = "libil2cpp.so";
pub const METADATA_NAME: &str = "global-metadata.dat";
pub const DUMP_NAME: &str = "dump.cs";
pub const KEYSTORE_NAME: &str = "debug.keystore";

const BUNDLE_URL: &str = "https://apkcombo.com/r2?u=https%3A%2F%2Fapks.39b7cb94d40914bac590886981b0ed6e.r2.cloudflarestorage.com%2Fcom.oddno.lovelive%2F4.1.10%2F86517.6afe26ed6421caba1e81b00a3acc76374155d19e.apks%3Fresponse-content-disposition%3Dattachment%253B%2520filename%253D%2522Link%25EF%25BC%2581Like%25EF%25BC%2581%25E3%2583%25A9%25E3%2583%2596%25E3%2583%25A9%25E3%2582%25A4%25E3%2583%2596%25EF%25BC%2581%25E8%2593%25AE%25E3%2583%258E%25E7%25A9%25BA%25E3%2582%25B9%25E3%2582%25AF%25E3%2583%25BC%25E3%2583%25AB%25E3%2582%25A2%25E3%2582%25A4%25E3%2583%2589%25E3%2583%25AB%25E3%2582%25AF%25E3%2583%25A9%25E3%2583%2596_4.1.10_apkcombo.com.xapk%2522%26response-content-type%3Dapplication%252Fxapk-package-archive%26X-Amz-Algorithm%3DAWS4-HMAC-SHA256%26X-Amz-Date%3D20250615T034727Z%26X-Amz-SignedHeaders%3Dhost%26X-Amz-Expires%3D14400%26X-Amz-Credential%3D3cb727b4cd4780c410b780ac7caa4da3%252F20250615%252Fauto%252Fs3%252Faws4_request%26X-Amz-Signature%3D51e3e922f91fe430920010eace04e6a99ff667c30da4a1c7883ded1a1404521f&fp=df425fcee0565cf6d4561887ea1a35ed&package_name=com.oddno.lovelive&lang=ja";
const DUMPER_URL: &str =
    "https://github.com/Perfare/Il2CppDumper/releases/download/v6.7.46/Il2CppDumper-win-v6.7.46.zip";
const APKTOOL_URL: &str =
    "https://github.com/iBotPeaches/Apktool/releases/download/v2.11.0/apktool_2.11.0.jar";
const GADGET_URL_ARM: &str =
    "https://github.com/frida/frida/releases/download/16.0.19/frida-gadget-16.0.19-android-arm.so.xz";
const GADGET_URL_ARM64: &str =
    "https://github.com/frida/frida/releases/download/16.0.19/frida-gadget-16.0.19-android-arm64.so.xz";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";
const REFERER: &str = "https://apkpure.com/";

/// Everything a stage needs to know about where things live and where they
/// come from. Built once per run and passed by reference to every stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Base for every relative path in `layout`. Not read from the file.
    #[serde(skip)]
    pub root: PathBuf,
    pub layout: Layout,
    pub sources: Sources,
    pub http: HttpSettings,
    pub dumper: DumperSettings,
    pub signing: SigningSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub temp_dir: PathBuf,
    pub tools_dir: PathBuf,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Sources {
    pub bundle_url: String,
    pub bundle_sha256: Option<String>,
    pub dumper_url: String,
    pub dumper_sha256: Option<String>,
    pub apktool_url: String,
    pub gadget_url_arm: String,
    pub gadget_url_arm64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub user_agent: String,
    pub referer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DumperSettings {
    /// File name of the dumper inside `tools/Il2CppDumper`.
    pub executable: String,
    /// Runtime to prefix the dumper with (`mono`, `dotnet`), if any.
    pub launcher: Option<String>,
    pub menu_input: String,
    /// Where the dumper leaves its listing, relative to its output dir.
    pub dump_relative_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningSettings {
    pub alias: String,
    pub store_password: String,
    pub key_password: String,
    pub key_algorithm: String,
    pub key_size: u32,
    pub validity_days: u32,
    pub dname: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::with_root(".")
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("temp"),
            tools_dir: PathBuf::from("tools"),
            output_dir: PathBuf::from("output"),
        }
    }
}

impl Default for Sources {
    fn default() -> Self {
        Self {
            bundle_url: BUNDLE_URL.to_string(),
            bundle_sha256: None,
            dumper_url: DUMPER_URL.to_string(),
            dumper_sha256: None,
            apktool_url: APKTOOL_URL.to_string(),
            gadget_url_arm: GADGET_URL_ARM.to_string(),
            gadget_url_arm64: GADGET_URL_ARM64.to_string(),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: USER_AGENT.to_string(),
            referer: Some(REFERER.to_string()),
        }
    }
}

impl Default for DumperSettings {
    fn default() -> Self {
        Self {
            executable: "Il2CppDumper.exe".to_string(),
            launcher: None,
            menu_input: "1\n".to_string(),
            dump_relative_path: PathBuf::from("script").join(DUMP_NAME),
        }
    }
}

impl Default for SigningSettings {
    fn default() -> Self {
        Self {
            alias: "androiddebugkey".to_string(),
            store_password: "android".to_string(),
            key_password: "android".to_string(),
            key_algorithm: "RSA".to_string(),
            key_size: 2048,
            validity_days: 10000,
            dname: "CN=Android Debug,O=Android,C=US".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn with_root<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            layout: Layout::default(),
            sources: Sources::default(),
            http: HttpSettings::default(),
            dumper: DumperSettings::default(),
            signing: SigningSettings::default(),
        }
    }

    /// Reads a JSON config file. Missing sections and fields keep their
    /// defaults.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(root: P, path: Q) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let mut config: PipelineConfig = serde_json::from_str(&contents)?;
        config.root = root.as_ref().to_path_buf();
        Ok(config)
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.temp_dir(), self.tools_dir(), self.output_dir()] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.root.join(&self.layout.temp_dir)
    }

    pub fn tools_dir(&self) -> PathBuf {
        self.root.join(&self.layout.tools_dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.layout.output_dir)
    }

    pub fn bundle_path(&self) -> PathBuf {
        self.temp_dir().join("bundle.xapk")
    }

    /// Where the outer bundle is unpacked.
    pub fn bundle_dir(&self) -> PathBuf {
        self.temp_dir().join("xapk_extracted")
    }

    /// Staging area holding one directory per extracted inner package.
    pub fn staging_dir(&self) -> PathBuf {
        self.temp_dir().join("apk_extracted")
    }

    pub fn dumper_dir(&self) -> PathBuf {
        self.tools_dir().join("Il2CppDumper")
    }

    pub fn dumper_executable(&self) -> PathBuf {
        self.dumper_dir().join(&self.dumper.executable)
    }

    pub fn apktool_dir(&self) -> PathBuf {
        self.tools_dir().join("apktool")
    }

    pub fn library_output(&self) -> PathBuf {
        self.output_dir().join(LIBRARY_NAME)
    }

    pub fn metadata_output(&self) -> PathBuf {
        self.output_dir().join(METADATA_NAME)
    }

    pub fn dump_dir(&self) -> PathBuf {
        self.output_dir().join("dump")
    }

    pub fn dump_output(&self) -> PathBuf {
        self.output_dir().join(DUMP_NAME)
    }

    pub fn keystore_path(&self) -> PathBuf {
        self.output_dir().join(KEYSTORE_NAME)
    }

    pub fn inject_work_dir(&self) -> PathBuf {
        self.temp_dir().join("apk_inject")
    }
}
