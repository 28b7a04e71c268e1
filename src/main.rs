use log::error;

use overlay3d::{CONFIG_FILE, OverlayConfig, OverlayError};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = OverlayConfig::load_or_default(CONFIG_FILE)?;

    match overlay3d::run(config) {
        Ok(_) => Ok(()),
        Err(e) if e.is_fatal() => Err(e.into()),
        Err(OverlayError::AssetLoad(e)) => {
            error!("Failed to load the 3D object: {e}");
            Ok(())
        }
        Err(e) => {
            error!("{e}");
            Ok(())
        }
    }
}
