//! Creating images from a bootstrap JDK and keeping their registries current.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::tempdir;
use vmimage::image::{create_image, ImageManager, ImageRequest};
use vmimage::install::Installer;
use vmimage::layout::{ImageLayout, Os, Platform};
use vmimage::prompt::NonInteractive;
use vmimage::registry;
use vmimage::vm::ENGINE_ALIASES;
use vmimage::{BuildKind, EngineVariant, ImageError, ImageSelector, Settings};

fn platform() -> Platform {
    Platform::new(Os::Linux, "amd64")
}

fn bootstrap(root: &Path) -> PathBuf {
    let home = root.join("bootstrap");
    let lib = home.join("jre/lib/amd64");
    fs::create_dir_all(lib.join("server")).unwrap();
    fs::write(lib.join("server/libjvm.so"), b"jvm").unwrap();
    fs::write(lib.join("jvm.cfg"), "# header\n-server KNOWN\n").unwrap();
    fs::write(
        home.join("release"),
        "JAVA_VERSION=\"1.8.0_92\"\nSOURCE=\" .:aaa hotspot:bbb jdk:ccc\"\n",
    )
    .unwrap();
    home
}

#[test]
fn create_image_renames_default_engine_to_original() {
    let dir = tempdir().unwrap();
    let home = bootstrap(dir.path());
    let image_dir = dir.path().join("jdk1.8.0_92/product");

    create_image(&home, &image_dir, &platform(), &Installer::default(), &dir.path().join("cache"))
        .unwrap();

    let image = ImageLayout::new(&image_dir, platform());
    let registry = fs::read_to_string(image.registry_file()).unwrap();
    let lines: Vec<&str> = registry.lines().collect();
    assert_eq!(lines[0], "# header");
    let original = lines.iter().position(|l| *l == "-original KNOWN").unwrap();
    assert!(lines[original - 1].starts_with('#'));
    assert!(!registry.contains("-server"));

    assert!(image.engine_dir("original").join("libjvm.so").is_file());
    assert!(!image.engine_dir("server").exists());
    // The bootstrap itself is untouched.
    assert!(home.join("jre/lib/amd64/server/libjvm.so").is_file());
}

#[test]
fn ensure_known_adds_engine_and_aliases_once() {
    let dir = tempdir().unwrap();
    let home = bootstrap(dir.path());
    let image_dir = dir.path().join("jdk1.8.0_92/product");
    create_image(&home, &image_dir, &platform(), &Installer::default(), &dir.path().join("cache"))
        .unwrap();
    let cfg = ImageLayout::new(&image_dir, platform()).registry_file();

    registry::ensure_known(&cfg, "jvmci", ENGINE_ALIASES).unwrap();
    let first = fs::read_to_string(&cfg).unwrap();
    registry::ensure_known(&cfg, "jvmci", ENGINE_ALIASES).unwrap();
    let second = fs::read_to_string(&cfg).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.matches("-jvmci KNOWN").count(), 1);
    assert!(first.contains("-graal ALIASED_TO -jvmci"));
    assert!(registry::is_known(&cfg, "original").unwrap());
}

#[test]
fn missing_engine_names_the_build_command() {
    let dir = tempdir().unwrap();
    let home = bootstrap(dir.path());
    let mut vars = BTreeMap::new();
    vars.insert("JAVA_HOME".to_string(), home.display().to_string());
    let mut settings = Settings::from_vars(dir.path(), dir.path().join(".vmimage/env"), vars);
    settings.platform = platform();

    let prompter = NonInteractive;
    let manager = ImageManager::new(&settings, &prompter);
    let mut selector = ImageSelector::new(Some(EngineVariant::Jvmci), BuildKind::FastDebug);

    let err = manager
        .image_dir(
            &mut selector,
            ImageRequest {
                create: true,
                deploy: false,
                check_engine: Some(EngineVariant::Jvmci),
            },
        )
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<ImageError>(),
        Some(ImageError::ImageMissing { .. })
    ));
    assert!(err
        .to_string()
        .contains("vmimage --vm jvmci --vmbuild fastdebug build"));
    // The image was still created.
    assert!(dir.path().join("jdk1.8.0_92/fastdebug/jre/lib/amd64/original").is_dir());
}
