use assessment_backend::{
    config::{get_config, init_config},
    database::pool::create_pool,
    middleware, routes, AppState,
};
use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
    init_config()?;
    let config = get_config();

    let pool = create_pool().await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    // Without the key set no bearer token can ever verify, so refuse to
    // start rather than serve 503s forever.
    middleware::auth::load_jwks().await?;

    let app_state = AppState::new(pool);

    let public_api = Router::new()
        .route("/health", get(routes::health::health))
        .route("/auth/create-user", post(routes::employee_routes::create_account));

    let test_api = Router::new()
        .route(
            "/tests",
            get(routes::test_routes::get_tests).post(routes::test_routes::create_test),
        )
        .route("/tests/assign", post(routes::test_routes::assign_tests))
        .route("/tests/unassign", post(routes::test_routes::unassign_tests))
        .route("/tests/assigned", get(routes::test_routes::get_assigned_tests))
        .route(
            "/tests/assigned/:id",
            get(routes::test_routes::get_assigned_test),
        )
        .route("/tests/answers", post(routes::test_routes::submit_answer))
        .route(
            "/tests/:id",
            get(routes::test_routes::get_test)
                .put(routes::test_routes::update_test)
                .delete(routes::test_routes::delete_test),
        )
        .route(
            "/tests/:id/status",
            patch(routes::test_routes::change_test_status),
        )
        .route("/tests/:id/start", post(routes::test_routes::start_test))
        .route("/tests/:id/complete", post(routes::test_routes::complete_test))
        .route("/tests/:id/results", get(routes::test_routes::get_test_results))
        .route(
            "/tests/:test_id/employees/:employee_id/reset",
            post(routes::test_routes::reset_test),
        );

    let employee_api = Router::new()
        .route(
            "/employees",
            get(routes::employee_routes::get_employees)
                .post(routes::employee_routes::create_employee),
        )
        .route(
            "/employees/batch",
            post(routes::employee_routes::provision_accounts),
        )
        .route(
            "/employees/:id",
            get(routes::employee_routes::get_employee)
                .patch(routes::employee_routes::update_employee)
                .delete(routes::employee_routes::delete_employee),
        )
        .route(
            "/me/profile",
            get(routes::employee_routes::get_profile)
                .patch(routes::employee_routes::update_profile)
                .delete(routes::employee_routes::delete_profile),
        );

    let position_api = Router::new()
        .route(
            "/positions",
            get(routes::position_routes::get_positions)
                .post(routes::position_routes::create_position),
        )
        .route(
            "/positions/:id",
            get(routes::position_routes::get_position)
                .put(routes::position_routes::update_position)
                .delete(routes::position_routes::delete_position),
        );

    let belbin_api = Router::new()
        .route(
            "/belbin/roles",
            get(routes::belbin_routes::get_roles).post(routes::belbin_routes::create_role),
        )
        .route(
            "/belbin/roles/:id",
            get(routes::belbin_routes::get_role)
                .put(routes::belbin_routes::update_role)
                .delete(routes::belbin_routes::delete_role),
        )
        .route(
            "/belbin/requirements",
            get(routes::belbin_routes::get_requirements)
                .post(routes::belbin_routes::save_requirements),
        )
        .route(
            "/belbin/requirements/:id",
            delete(routes::belbin_routes::delete_requirement),
        )
        .route(
            "/belbin/fit/:test_id/:employee_id",
            get(routes::belbin_routes::evaluate_fit),
        );

    let protected = test_api
        .merge(employee_api)
        .merge(position_api)
        .merge(belbin_api)
        .layer(axum::middleware::from_fn(
            middleware::auth::require_bearer_auth,
        ));

    let app = public_api
        .merge(protected)
        .with_state(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
