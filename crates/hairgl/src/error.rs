use crate::AssetId;
use hair_core::AssetError;
use hair_gpu::DeviceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HairError {
    #[error("asset load error: {0}")]
    AssetLoad(#[from] AssetError),

    #[error("initialization error: {0}")]
    Initialization(#[from] DeviceError),

    #[error("unknown or destroyed asset {0}")]
    UnknownAsset(AssetId),
}
