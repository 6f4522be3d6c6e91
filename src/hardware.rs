use std::{env, path::Path};

/// True when a CUDA device is usable from this process.
pub fn accelerator_available() -> bool {
    if devices_hidden(env::var("CUDA_VISIBLE_DEVICES").ok().as_deref()) {
        return false;
    }
    device_present()
}

#[cfg(feature = "tch-backend")]
fn device_present() -> bool {
    tch::Cuda::is_available()
}

#[cfg(not(feature = "tch-backend"))]
fn device_present() -> bool {
    Path::new("/dev/nvidia0").exists()
}

fn devices_hidden(visible: Option<&str>) -> bool {
    matches!(visible.map(str::trim), Some("") | Some("-1"))
}

pub fn artifact_size(path: &Path) -> u64 {
    path.metadata().map(|m| m.len()).unwrap_or(0)
}
