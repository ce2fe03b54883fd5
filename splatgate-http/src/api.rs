use crate::{SPLAT_DESC, SPLAT_TAG, STATUS_DESC, STATUS_TAG};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(title = "Splatgate Image-to-3D API Specifications"),
    tags(
        (name = STATUS_TAG, description = STATUS_DESC),
        (name = SPLAT_TAG, description = SPLAT_DESC)
    )
)]
pub struct ApiDoc;
