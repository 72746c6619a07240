use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::config::AppConfig;
use crate::handlers;
use crate::state::AppState;

pub fn routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest("/auth", auth_routes())
        .nest("/measurements", measurement_routes(config))
        .nest("/map", map_routes())
        .nest("/export", export_routes())
        .nest("/admin", admin_routes(config))
}

fn auth_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::auth::register))
        .routes(routes!(handlers::auth::login))
        .routes(routes!(handlers::auth::me))
}

fn measurement_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    let upload = OpenApiRouter::new()
        .routes(routes!(
            handlers::measurement::create_measurement,
            handlers::measurement::list_measurements
        ))
        .layer(handlers::measurement::measurement_body_limit(
            config.storage.max_photo_size,
        ));

    let download = OpenApiRouter::new().routes(routes!(handlers::measurement::download_photo));

    upload.merge(download)
}

fn map_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(handlers::map::weekly_map))
}

fn export_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(handlers::export::export_csv))
}

fn admin_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    let icon_upload = OpenApiRouter::new()
        .routes(routes!(handlers::admin::upload_company_icon))
        .layer(handlers::measurement::measurement_body_limit(
            config.storage.max_photo_size,
        ));

    OpenApiRouter::new()
        .routes(routes!(handlers::admin::list_users, handlers::admin::create_user))
        .routes(routes!(handlers::admin::update_user, handlers::admin::delete_user))
        .routes(routes!(handlers::admin::list_companies))
        .routes(routes!(handlers::admin::company_dossier))
        .routes(routes!(handlers::admin::update_company_profile))
        .routes(routes!(handlers::admin::validate_measurement))
        .routes(routes!(handlers::admin::delete_measurement))
        .merge(icon_upload)
}
