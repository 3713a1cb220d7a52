//! Fixtures for tests: fake FFmpeg archives and pre-seeded vcpkg trees.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::config::{PrepConfig, PrepContext};
use crate::extract::REQUIRED_FILES;
use crate::platform::{HostArch, HostOs, PlatformProfile};

pub const FFMPEG_C: &str = r#"#include "config.h"
static int run(void) { return 0; }

int main(int argc, char **argv)
{
    return run();
}
"#;

pub const FFMPEG_DEC_C: &str = "#include <stdint.h>\n\
#include <stdbit.h>\n\
\n\
static int bits(unsigned x) { return stdc_count_ones(x); }\n";

pub fn linux_ctx(root: &Path) -> PrepContext {
    PrepContext::with_platform(
        PrepConfig::new(root),
        PlatformProfile::resolve(HostOs::Linux, HostArch::X64),
    )
}

/// Source files of a complete tree, relative to the tree root.
pub fn complete_tree_files() -> Vec<(String, String)> {
    let mut files: Vec<(String, String)> = REQUIRED_FILES
        .iter()
        .map(|rel| (rel.to_string(), format!("/* {} */\n", rel)))
        .collect();
    for (rel, content) in files.iter_mut() {
        if rel == "fftools/ffmpeg_dec.c" {
            *content = FFMPEG_DEC_C.to_string();
        }
    }
    files.push(("fftools/ffmpeg.c".to_string(), FFMPEG_C.to_string()));
    files
}

/// Write a gzip tarball whose entries all sit under `top/`.
pub fn write_archive(path: &Path, top: &str, files: &[(String, String)]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (rel, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, format!("{}/{}", top, rel), content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

/// Put a complete FFmpeg archive in the vcpkg download cache.
pub fn seed_archive(ctx: &PrepContext) -> PathBuf {
    let path = ctx.config.downloads_dir().join("ffmpeg-n7.1.tar.gz");
    write_archive(&path, "FFmpeg-n7.1", &complete_tree_files());
    path
}

/// Make vcpkg look cloned, bootstrapped and installed.
pub fn seed_installed_vcpkg(ctx: &PrepContext) {
    fs::create_dir_all(ctx.vcpkg_root()).unwrap();
    fs::write(ctx.vcpkg_exe(), b"").unwrap();
    let lib_dir = ctx.lib_dir();
    fs::create_dir_all(&lib_dir).unwrap();
    for lib in crate::deps::REQUIRED_LIBS {
        fs::write(lib_dir.join(format!("lib{}.a", lib)), b"").unwrap();
    }
}

/// Write vcpkg's generated headers into the build tree.
pub fn seed_generated_headers(ctx: &PrepContext) {
    let buildtree = ctx.buildtree_dir();
    fs::create_dir_all(&buildtree).unwrap();
    fs::write(buildtree.join("config.h"), "#define HAVE_STDBIT_H 0\n").unwrap();
    fs::write(
        buildtree.join("config_components.h"),
        "#define CONFIG_H264_DECODER 1\n",
    )
    .unwrap();
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a thread-local subscriber and return everything it logged.
pub fn captured_logs(f: impl FnOnce()) -> String {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    let bytes = buffer.0.lock().unwrap().clone();
    String::from_utf8_lossy(&bytes).into_owned()
}
