//! MCP server configuration — re-exported from `sa-domain`.
//!
//! The canonical definition lives in `sa_domain::config` so that other
//! crates' config deserializers can include it without depending on the
//! full MCP client crate. Only the stdio child-process transport is
//! modeled (SPEC_FULL §4.4(b)); there is no transport-kind enum to pick
//! from.

pub use sa_domain::config::McpServerConfig;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_server_config() {
        let raw = r#"{
            "id": "filesystem",
            "command": "npx",
            "args": ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"]
        }"#;
        let cfg: McpServerConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.id, "filesystem");
        assert_eq!(cfg.command, "npx");
        assert_eq!(cfg.args.len(), 3);
    }

    #[test]
    fn command_and_args_default_empty() {
        let raw = r#"{ "id": "test" }"#;
        let cfg: McpServerConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.command, "");
        assert!(cfg.args.is_empty());
    }

    #[test]
    fn deserialize_with_env() {
        let raw = r#"{
            "id": "test",
            "command": "node",
            "args": ["server.js"],
            "env": { "NODE_ENV": "production" }
        }"#;
        let cfg: McpServerConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.env.get("NODE_ENV").unwrap(), "production");
    }
}
