use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "vendsync API",
        version = "0.1.0",
        description = "Vendor catalog harvesting, pricing and hub reconciliation."
    ),
    paths(
        crate::routes::start_harvest,
        crate::routes::progress,
        crate::routes::list_targets,
        crate::routes::get_staged,
        crate::routes::list_sources,
        crate::routes::diff,
        crate::routes::commit,
        crate::routes::health,
    ),
    components(schemas(
        crate::dto::HarvestRequest,
        crate::dto::HarvestAccepted,
        crate::dto::TargetResponse,
        crate::dto::TargetListResponse,
        crate::dto::StagedLineResponse,
        crate::dto::StagedResponse,
        crate::dto::SourceListResponse,
        crate::dto::DiffRequest,
        crate::dto::DiffItemDto,
        crate::dto::DiffReportDto,
        crate::dto::PriceChangeDto,
        crate::dto::CommitRequest,
        crate::dto::CommitResponse,
        crate::dto::HealthResponse,
        crate::dto::ErrorResponse,
    )),
    tags(
        (name = "harvests", description = "Crawl runs and their progress streams"),
        (name = "targets", description = "Scrape targets, sources and staged lines"),
        (name = "reconcile", description = "Diff against the hub and commit prices"),
        (name = "system", description = "Health and system status"),
    )
)]
pub struct ApiDoc;
