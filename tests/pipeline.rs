mod common;

use apkrig::apktool::{BuildMode, DecodeMode};
use apkrig::gadget::GadgetArch;
use apkrig::{Pipeline, PipelineError, SignOutcome};
use common::*;
use std::fs;
use std::io::ErrorKind;
use tempfile::TempDir;

fn pipeline(root: &TempDir, bench: &Workbench, fetch: &FakeFetch) -> Pipeline {
    Pipeline::new(
        config_in(root.path()),
        Box::new(bench.clone()),
        Box::new(fetch.clone()),
    )
}

#[test]
fn decode_retries_then_reaches_signing() {
    let root = TempDir::new().unwrap();
    let input = write_package_set(&root.path().join("in"));
    let bench = Workbench {
        decode_failures: 2,
        ..Default::default()
    };
    let fetch = FakeFetch::default();

    let report = pipeline(&root, &bench, &fetch).inject(Some(input.as_path())).unwrap();

    assert_eq!(report.decode_mode, DecodeMode::MainClassesOnly);
    assert_eq!(report.build_mode, Some(BuildMode::Aapt2));
    assert_eq!(report.arch, GadgetArch::Arm64);

    let output = root.path().join("output");
    assert_eq!(
        report.signed,
        SignOutcome::Signed(output.join("com.oddno.lovelive-injected-signed.apk"))
    );
    assert!(output.join("debug.keystore").is_file());
    assert_eq!(bench.calls_to("apktool").len(), 4);
    assert_eq!(bench.calls_to("apksigner").len(), 2);

    let work = root.path().join("temp/apk_inject");
    let manifest = fs::read_to_string(work.join("AndroidManifest.xml")).unwrap();
    assert!(manifest.contains(r#"<application android:name="io.frida.FridaApplication""#));
    assert!(work.join("smali/io/frida/FridaApplication.smali").is_file());
    assert_eq!(
        fs::read(work.join("lib/arm64-v8a/libfrida-gadget.so")).unwrap(),
        b"\x7fELFgadget"
    );
}

#[test]
fn splits_are_copied_and_signed() {
    let root = TempDir::new().unwrap();
    let input = write_package_set(&root.path().join("in"));
    let bench = Workbench::default();
    let fetch = FakeFetch::default();

    let report = pipeline(&root, &bench, &fetch).inject(Some(input.as_path())).unwrap();

    let output = root.path().join("output");
    assert_eq!(report.splits.len(), 1);
    let split = &report.splits[0];
    assert_eq!(split.copy, output.join("config.arm64_v8a.apk"));
    assert!(split.copy.is_file());
    assert_eq!(
        split.outcome,
        SignOutcome::Signed(output.join("config.arm64_v8a-signed.apk"))
    );
}

#[test]
fn missing_signing_tools_leave_unsigned_output() {
    let root = TempDir::new().unwrap();
    let input = write_package_set(&root.path().join("in"));
    let bench = Workbench {
        missing: vec!["apksigner", "jarsigner"],
        ..Default::default()
    };
    let fetch = FakeFetch::default();

    let report = pipeline(&root, &bench, &fetch).inject(Some(input.as_path())).unwrap();

    let unsigned = root.path().join("output/com.oddno.lovelive-injected.apk");
    assert_eq!(report.signed, SignOutcome::Unsigned(unsigned.clone()));
    assert_eq!(fs::read(&unsigned).unwrap(), b"rebuilt");
    assert!(!root
        .path()
        .join("output/com.oddno.lovelive-injected-signed.apk")
        .exists());
    assert!(report
        .splits
        .iter()
        .all(|s| matches!(s.outcome, SignOutcome::Unsigned(_))));
}

#[test]
fn failed_rebuild_passes_original_through() {
    let root = TempDir::new().unwrap();
    let input = write_package_set(&root.path().join("in"));
    let bench = Workbench {
        build_fails: true,
        ..Default::default()
    };
    let fetch = FakeFetch::default();

    let report = pipeline(&root, &bench, &fetch).inject(Some(input.as_path())).unwrap();

    assert!(!report.instrumented());
    assert_eq!(
        fs::read(&report.unsigned).unwrap(),
        fs::read(&input).unwrap()
    );
    assert!(report.signed.is_signed());
}

#[test]
fn exhausted_decode_ladder_is_fatal() {
    let root = TempDir::new().unwrap();
    let input = write_package_set(&root.path().join("in"));
    let bench = Workbench {
        decode_failures: 3,
        ..Default::default()
    };
    let fetch = FakeFetch::default();

    let err = pipeline(&root, &bench, &fetch)
        .inject(Some(input.as_path()))
        .unwrap_err();
    assert!(matches!(err, PipelineError::ToolFailed { .. }));
    assert!(bench.calls_to("keytool").is_empty());
}

#[test]
fn timed_out_tool_is_not_retried() {
    struct Hangs;
    impl apkrig::ToolRunner for Hangs {
        fn run(&self, _: &apkrig::Invocation) -> apkrig::Result<apkrig::ToolOutput> {
            Err(std::io::Error::new(ErrorKind::TimedOut, "decoder timed out").into())
        }
    }

    let root = TempDir::new().unwrap();
    let input = write_package_set(&root.path().join("in"));
    let pipeline = Pipeline::new(
        config_in(root.path()),
        Box::new(Hangs),
        Box::new(FakeFetch::default()),
    );

    match pipeline.inject(Some(input.as_path())) {
        Err(PipelineError::Io(e)) => assert_eq!(e.kind(), ErrorKind::TimedOut),
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn full_run_from_download_to_signed_package() {
    let root = TempDir::new().unwrap();
    let config = config_in(root.path());

    let staging = TempDir::new().unwrap();
    write_package_set(staging.path());
    let main = fs::read(staging.path().join("com.oddno.lovelive.apk")).unwrap();
    let split = fs::read(staging.path().join("config.arm64_v8a.apk")).unwrap();

    let fetch = FakeFetch::default()
        .with(
            &config.sources.bundle_url,
            zip_bytes(&[
                ("manifest.json", b"{}"),
                ("com.oddno.lovelive.apk", main.as_slice()),
                ("config.arm64_v8a.apk", split.as_slice()),
                ("icon.png", b"png"),
            ]),
        )
        .with(
            &config.sources.dumper_url,
            zip_bytes(&[("Il2CppDumper.exe", b"MZ"), ("config.json", b"{}")]),
        );
    let bench = Workbench::default();

    let report = pipeline(&root, &bench, &fetch).run_all(None).unwrap();

    let output = root.path().join("output");
    assert_eq!(report.fetched.bundle_entries, 4);
    assert!(root.path().join("tools/Il2CppDumper/Il2CppDumper.exe").is_file());
    assert_eq!(fs::read(output.join("libil2cpp.so")).unwrap(), b"\x7fELFlibrary");
    assert!(output.join("global-metadata.dat").is_file());
    assert_eq!(report.dump, output.join("dump.cs"));
    assert_eq!(
        report.inject.input,
        root.path().join("temp/xapk_extracted/com.oddno.lovelive.apk")
    );
    assert!(report.inject.signed.is_signed());

    let requested = fetch.requested.borrow();
    assert_eq!(requested[0], config.sources.bundle_url);
    assert_eq!(requested[1], config.sources.dumper_url);
    assert!(requested.contains(&config.sources.gadget_url_arm64));
}

#[test]
fn checksum_pin_rejects_tampered_bundle() {
    let root = TempDir::new().unwrap();
    let mut config = config_in(root.path());
    config.sources.bundle_sha256 = Some("00".repeat(32));

    let pipeline = Pipeline::new(
        config,
        Box::new(Workbench::default()),
        Box::new(FakeFetch::default()),
    );

    assert!(matches!(
        pipeline.fetch(),
        Err(PipelineError::ChecksumMismatch { .. })
    ));
    assert!(!root.path().join("temp/bundle.xapk").exists());
}
