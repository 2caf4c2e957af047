use crate::{
    api::{employee, expense, role, salary_slip, stats},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
    error::ApiError,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

// Helper to build per-route limiter
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / u64::from(requests_per_min)).max(1);
    let cfg = GovernorConfigBuilder::default()
        .milliseconds_per_request(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_default();
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let register_limiter = Arc::new(build_limiter(config.rate_register_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // malformed bodies and query strings answer with the same JSON shape as every other error
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| ApiError::bad_request(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| ApiError::bad_request(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _req| ApiError::bad_request(err.to_string()).into()),
    );

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/signup")
                    .wrap(register_limiter.clone())
                    .route(web::post().to(handlers::signup)),
            )
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/session")
                    .wrap(refresh_limiter.clone())
                    .route(web::get().to(handlers::session)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(web::resource("/profile").route(web::get().to(employee::get_own_profile)))
            .service(
                web::scope("/employees")
                    // /employees
                    .service(web::resource("").route(web::get().to(employee::list_employees)))
                    // /employees/{user_id}
                    .service(
                        web::resource("/{user_id}")
                            .route(web::get().to(employee::get_employee))
                            .route(web::put().to(employee::update_employee))
                            .route(web::delete().to(employee::delete_employee)),
                    ),
            )
            .service(
                web::scope("/salary-slips")
                    // /salary-slips
                    .service(
                        web::resource("")
                            .route(web::get().to(salary_slip::list_salary_slips))
                            .route(web::post().to(salary_slip::create_salary_slip)),
                    )
                    // /salary-slips/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(salary_slip::get_salary_slip))
                            .route(web::put().to(salary_slip::update_salary_slip)),
                    )
                    // /salary-slips/{id}/status
                    .service(
                        web::resource("/{id}/status")
                            .route(web::put().to(salary_slip::update_salary_slip_status)),
                    ),
            )
            .service(
                web::scope("/expenses")
                    // /expenses
                    .service(
                        web::resource("")
                            .route(web::get().to(expense::list_expenses))
                            .route(web::post().to(expense::create_expense)),
                    )
                    // /expenses/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(expense::get_expense))
                            .route(web::put().to(expense::update_expense))
                            .route(web::delete().to(expense::delete_expense)),
                    )
                    // /expenses/{id}/approve
                    .service(
                        web::resource("/{id}/approve").route(web::put().to(expense::approve_expense)),
                    )
                    // /expenses/{id}/reject
                    .service(
                        web::resource("/{id}/reject").route(web::put().to(expense::reject_expense)),
                    ),
            )
            .service(
                web::scope("/stats")
                    .service(web::resource("/admin").route(web::get().to(stats::admin_stats)))
                    .service(web::resource("/employee").route(web::get().to(stats::employee_stats)))
                    .service(web::resource("/payroll-trend").route(web::get().to(stats::payroll_trend)))
                    .service(web::resource("/expense-trend").route(web::get().to(stats::expense_trend)))
                    .service(web::resource("/salary-history").route(web::get().to(stats::salary_history))),
            )
            .service(web::resource("/roles/{user_id}").route(web::get().to(role::get_role))),
    );
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ returns new access_token + rotated refresh_token

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{generate_access_token, generate_refresh_token};
    use crate::db::lazy_pool;
    use crate::model::role::Role;
    use crate::utils::query_cache::StatsCache;
    use actix_web::{App, http::StatusCode, test, web::Data};
    use serde_json::{Value, json};
    use std::net::SocketAddr;
    use std::time::Duration;

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn token(role: Role, user_id: u64) -> String {
        let config = Config::for_tests();
        generate_access_token(
            user_id,
            format!("user{user_id}@company.com"),
            role,
            &config.jwt_secret,
            config.access_token_ttl,
        )
        .unwrap()
    }

    macro_rules! app {
        () => {{
            let config = Config::for_tests();
            test::init_service(
                App::new()
                    .app_data(Data::new(lazy_pool(&config.database_url)))
                    .app_data(Data::new(config.clone()))
                    .app_data(Data::new(StatsCache::new(Duration::from_secs(config.stats_cache_ttl))))
                    .configure(|cfg| configure(cfg, config.clone())),
            )
            .await
        }};
    }

    async fn body_json(resp: actix_web::dev::ServiceResponse) -> Value {
        let bytes = test::read_body(resp).await;
        serde_json::from_slice(&bytes).unwrap()
    }

    #[actix_web::test]
    async fn protected_routes_require_a_token() {
        let app = app!();
        for uri in ["/api/expenses", "/api/salary-slips", "/api/stats/employee", "/api/profile"] {
            let req = test::TestRequest::get().uri(uri).peer_addr(peer()).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{uri}");
            let body = body_json(resp).await;
            assert_eq!(body["message"], "Missing Authorization header");
        }
    }

    #[actix_web::test]
    async fn garbage_and_refresh_tokens_are_rejected() {
        let app = app!();
        let config = Config::for_tests();
        let (refresh, _) = generate_refresh_token(
            7,
            "user7@company.com".into(),
            Role::Employee,
            &config.jwt_secret,
            60,
        )
        .unwrap();

        for bearer in ["not-a-jwt".to_string(), refresh] {
            let req = test::TestRequest::get()
                .uri("/api/expenses")
                .insert_header(("Authorization", format!("Bearer {bearer}")))
                .peer_addr(peer())
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[actix_web::test]
    async fn employees_are_kept_out_of_admin_routes() {
        let app = app!();
        let bearer = format!("Bearer {}", token(Role::Employee, 7));

        let admin_only = [
            test::TestRequest::get().uri("/api/employees"),
            test::TestRequest::get().uri("/api/employees/8"),
            test::TestRequest::delete().uri("/api/employees/8"),
            test::TestRequest::get().uri("/api/stats/admin"),
            test::TestRequest::get().uri("/api/stats/payroll-trend"),
            test::TestRequest::get().uri("/api/stats/expense-trend"),
            test::TestRequest::get().uri("/api/roles/8"),
            test::TestRequest::put().uri("/api/expenses/3/approve"),
            test::TestRequest::put().uri("/api/expenses/3/reject"),
            test::TestRequest::post()
                .uri("/api/salary-slips")
                .set_json(json!({"employee_id": 7, "month": "May", "year": 2026})),
            test::TestRequest::put()
                .uri("/api/salary-slips/1/status")
                .set_json(json!({"status": "approved"})),
        ];

        for req in admin_only {
            let req = req
                .insert_header(("Authorization", bearer.clone()))
                .peer_addr(peer())
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::FORBIDDEN);
            let body = body_json(resp).await;
            assert_eq!(body["message"], "Admin only");
        }
    }

    #[actix_web::test]
    async fn invalid_expense_reports_field_errors() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/api/expenses")
            .insert_header(("Authorization", format!("Bearer {}", token(Role::Employee, 7))))
            .set_json(json!({"title": "", "category": "Snacks", "amount": 0}))
            .peer_addr(peer())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(resp).await;
        assert_eq!(body["message"], "Validation failed");
        assert_eq!(body["errors"]["title"], "Title is required");
        assert_eq!(body["errors"]["category"], "Please select a valid category");
        assert_eq!(body["errors"]["amount"], "Amount must be greater than zero");
        assert_eq!(body["errors"]["date"], "Date is required");
    }

    #[actix_web::test]
    async fn invalid_salary_slip_is_rejected_before_any_lookup() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/api/salary-slips")
            .insert_header(("Authorization", format!("Bearer {}", token(Role::Admin, 1))))
            .set_json(json!({"employee_id": 7, "month": "Smarch", "year": 2019, "basic_salary": -5}))
            .peer_addr(peer())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(resp).await;
        assert!(body["errors"]["month"].is_string());
        assert!(body["errors"]["year"].is_string());
        assert!(body["errors"]["basic_salary"].is_string());
    }

    #[actix_web::test]
    async fn invalid_signup_reports_field_errors() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/auth/signup")
            .set_json(json!({
                "email": "jane@",
                "password": "123",
                "confirm_password": "321",
                "full_name": "J"
            }))
            .peer_addr(peer())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(resp).await;
        assert_eq!(body["errors"]["email"], "Please enter a valid email");
        assert_eq!(body["errors"]["confirm_password"], "Passwords do not match");
    }

    #[actix_web::test]
    async fn malformed_json_is_a_json_bad_request() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/auth/login")
            .insert_header(("Content-Type", "application/json"))
            .set_payload("{not json")
            .peer_addr(peer())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert!(body["message"].is_string());
    }

    #[actix_web::test]
    async fn admin_cannot_delete_own_account() {
        let app = app!();
        let req = test::TestRequest::delete()
            .uri("/api/employees/1")
            .insert_header(("Authorization", format!("Bearer {}", token(Role::Admin, 1))))
            .peer_addr(peer())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn logout_without_a_token_is_still_no_content() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/auth/logout")
            .peer_addr(peer())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[actix_web::test]
    async fn session_requires_an_access_token() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/auth/session")
            .peer_addr(peer())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn limiter_tolerates_zero_and_huge_rates() {
        build_limiter(0);
        build_limiter(1_000_000);
    }
}
