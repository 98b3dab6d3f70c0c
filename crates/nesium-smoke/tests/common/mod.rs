#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Writes a minimal iNES image with the given mapper number.
pub fn write_rom(root: &Path, rel: &str, mapper: u8) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut bytes = vec![0u8; 16 + 16 * 1024 + 8 * 1024];
    bytes[0..4].copy_from_slice(b"NES\x1A");
    bytes[4] = 1;
    bytes[5] = 1;
    bytes[6] = (mapper & 0x0F) << 4;
    bytes[7] = mapper & 0xF0;
    fs::write(&path, bytes).unwrap();
    path
}

/// Writes an executable `/bin/sh` script.
#[cfg(unix)]
pub fn write_script(path: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    path.to_path_buf()
}

/// Stand-in harness that picks its behaviour from the ROM file name and logs
/// every invocation to `calls`.
///
/// - `*boots.nes`: progressing picture
/// - `*jam.nes`: jams after booting
/// - `*crash.nes`: exits non-zero
/// - `*hang.nes`: never finishes
/// - `*garbage.nes`: prints no protocol lines
/// - `*lying.nes`: prints a failure status but exits 0
#[cfg(unix)]
pub fn fake_harness(dir: &Path, calls: &Path) -> PathBuf {
    let body = format!(
        r#"echo "$1" >> "{calls}"
case "$1" in
  *boots.nes) printf 'status=ok\njammed=0\nframes=%s\nchanged_frames=10\nunique_hashes=5\n' "$2" ;;
  *jam.nes) printf 'status=ok\njammed=1\nchanged_frames=4\nunique_hashes=3\n' ;;
  *crash.nes) echo 'status=load_fail'; echo 'bad mapper' >&2; exit 1 ;;
  *hang.nes) exec sleep 30 ;;
  *garbage.nes) echo 'hello there' ;;
  *lying.nes) echo 'status=init_fail' ;;
  *) printf 'status=ok\njammed=0\nchanged_frames=0\nunique_hashes=1\n' ;;
esac"#,
        calls = calls.display()
    );
    write_script(&dir.join("fake-harness.sh"), &body)
}

/// Number of lines in the invocation log; zero when it was never created.
pub fn invocations(calls: &Path) -> usize {
    fs::read_to_string(calls)
        .map(|text| text.lines().count())
        .unwrap_or(0)
}

/// Report rows keyed by `rom`, each as column -> value.
pub fn read_report(path: &Path) -> BTreeMap<String, BTreeMap<String, String>> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let headers = reader.headers().unwrap().clone();
    reader
        .records()
        .map(|record| {
            let record = record.unwrap();
            let row: BTreeMap<String, String> = headers
                .iter()
                .zip(record.iter())
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            (row["rom"].clone(), row)
        })
        .collect()
}
