use super::*;
use console_session::platform::KeyValueStore;

#[test]
fn parse_method_accepts_any_case() {
    assert_eq!(parse_method("get").ok(), Some(Method::Get));
    assert_eq!(parse_method("Post").ok(), Some(Method::Post));
    assert_eq!(parse_method("PUT").ok(), Some(Method::Put));
    assert_eq!(parse_method("delete").ok(), Some(Method::Delete));
}

#[test]
fn parse_method_rejects_patch() {
    assert!(matches!(parse_method("PATCH"), Err(CliError::InvalidMethod(m)) if m == "PATCH"));
}

#[test]
fn remaining_renders_as_minutes_and_seconds() {
    assert_eq!(format_remaining(1800), "30:00");
    assert_eq!(format_remaining(61), "01:01");
    assert_eq!(format_remaining(0), "00:00");
}

#[test]
fn decisions_render_for_humans() {
    let allow = GuardDecision::Allow { path: "/users".into(), title: "Users".into() };
    let redirect = GuardDecision::Redirect { to: "/login?redirect=%2Fusers".into() };

    assert_eq!(describe_decision(&allow), "allow /users (Users)");
    assert_eq!(describe_decision(&redirect), "redirect /login?redirect=%2Fusers");
}

#[test]
fn login_command_parses_flags() {
    let cli = Cli::try_parse_from(["console-cli", "--base-url", "http://h:5000/", "login", "alice", "--remember"])
        .expect("parse");

    assert_eq!(cli.base_url.as_deref(), Some("http://h:5000/"));
    match cli.command {
        Command::Login(args) => {
            assert_eq!(args.username, "alice");
            assert!(args.remember);
        }
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn api_command_takes_method_path_and_data() {
    let cli = Cli::try_parse_from(["console-cli", "api", "post", "/api/agents", "--data", "{\"name\":\"a\"}"])
        .expect("parse");

    match cli.command {
        Command::Api(args) => {
            assert_eq!(args.method, "post");
            assert_eq!(args.path, "/api/agents");
            assert_eq!(args.data.as_deref(), Some("{\"name\":\"a\"}"));
        }
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn join_roles_lists_names() {
    let user: User = serde_json::from_value(json!({ "id": 7, "username": "bob", "roles": ["Admin", "Editor"] }))
        .expect("user");
    let anonymous: User = serde_json::from_value(json!({ "id": 8, "username": "eve" })).expect("user");

    assert_eq!(join_roles(&user), "Admin, Editor");
    assert_eq!(join_roles(&anonymous), "no roles");
}

#[test]
fn theme_command_persists_choice() {
    let dir = tempfile::tempdir().expect("tempdir");
    let session = build_session(Some("http://127.0.0.1:9"), Some(dir.path().to_path_buf())).expect("session");

    run_theme(&session, Some("LIGHT")).expect("set");
    assert_eq!(session.persistent.get("theme").as_deref(), Some("light"));

    run_theme(&session, Some("toggle")).expect("toggle");
    assert_eq!(session.persistent.get("theme").as_deref(), Some("dark"));

    assert!(matches!(run_theme(&session, Some("neon")), Err(CliError::Theme(_))));
}
