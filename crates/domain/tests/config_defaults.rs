use sa_domain::config::{AgentLoopConfig, CoreConfig};

#[test]
fn default_max_tool_loop_is_ten() {
    let config = CoreConfig::default();
    assert_eq!(config.agent_loop.max_tool_loop, 10);
}

#[test]
fn explicit_agent_loop_overrides_parse() {
    let json = r#"{
        "agent_loop": { "max_tool_loop": 25, "trim_cap_chars": 64 }
    }"#;
    let config: CoreConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.agent_loop.max_tool_loop, 25);
    assert_eq!(config.agent_loop.trim_cap_chars, 64);
    // token_budget_chars falls back to its default when omitted.
    assert_eq!(
        config.agent_loop.token_budget_chars,
        AgentLoopConfig::default().token_budget_chars
    );
}
