//! Gate benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::json;
use sso_gate::auth::{IgnoreRule, PathExemptions, TokenVerifier};
use sso_gate::config::AuthConfig;
use sso_gate::gate::{Gate, GateRequest};
use sso_gate::session::Session;

const SECRET: &str = "benchmark-signing-secret-long-enough-for-hs512";

fn token() -> String {
    encode(
        &Header::new(Algorithm::HS512),
        &json!({"exp": chrono::Utc::now().timestamp() + 3600, "user": {"id": 1}}),
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn benchmark_token_verification(c: &mut Criterion) {
    let verifier = TokenVerifier::new(SECRET, "HS512").unwrap();
    let token = token();

    c.bench_function("verify_hs512", |b| {
        b.iter(|| verifier.verify(black_box(&token)).unwrap());
    });
}

fn benchmark_exemptions(c: &mut Criterion) {
    let rules: Vec<IgnoreRule> = (0..20)
        .map(|i| IgnoreRule::path(&format!("/static/v{}/*", i)))
        .chain([IgnoreRule::method_and_path("G*", "/public*")])
        .collect();
    let exemptions = PathExemptions::new(&rules).unwrap();

    let mut group = c.benchmark_group("exemptions");
    group.bench_function("last_rule_hit", |b| {
        b.iter(|| exemptions.is_exempt(black_box("GET"), black_box("/public/info")));
    });
    group.bench_function("miss", |b| {
        b.iter(|| exemptions.is_exempt(black_box("POST"), black_box("/api/orders/42")));
    });
    group.finish();
}

fn benchmark_evaluate(c: &mut Criterion) {
    let gate = Gate::from_config(&AuthConfig {
        signing_key: Some(SECRET.into()),
        login_redirect_url: Some("https://sso.example.com/login".into()),
        ..Default::default()
    })
    .unwrap();

    let mut session = Session::generate();
    let login = GateRequest::new(
        "GET",
        &format!("http://app.example.org/?jwt_authentication_token={}", token()),
    )
    .unwrap();
    gate.evaluate(&login, &mut session);

    let request = GateRequest::new("GET", "http://app.example.org/dashboard").unwrap();
    c.bench_function("evaluate_authenticated_session", |b| {
        b.iter(|| gate.evaluate(black_box(&request), &mut session));
    });
}

criterion_group!(
    benches,
    benchmark_token_verification,
    benchmark_exemptions,
    benchmark_evaluate
);
criterion_main!(benches);
