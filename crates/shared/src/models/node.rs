use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Prefix the center's mDNS browser puts in front of every advertised node name.
const ADVERTISED_PREFIX: &str = "Speedtest Node on ";
/// Start of the `_speedtest._tcp.local.` service suffix.
const SERVICE_SUFFIX: &str = "._speedt";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct NodeInfo {
    pub ip: String,
    pub port: u16,
    // Liveness as reported by the center, only ever displayed
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub info: NodeInfo,
}

impl Node {
    pub fn new(name: impl Into<String>, info: NodeInfo) -> Self {
        Self {
            name: name.into(),
            info,
        }
    }

    pub fn display_name(&self) -> String {
        display_name(&self.name)
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.info.ip, self.info.port)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name(), self.endpoint())
    }
}

/// Human label for an advertised node name.
///
/// `"Speedtest Node on lab-pi._speedtest._tcp.local."` becomes `"lab-pi"`.
/// Names that do not follow the advertised format are returned unchanged.
pub fn display_name(name: &str) -> String {
    let name = name.replacen(ADVERTISED_PREFIX, "", 1);
    match name.find(SERVICE_SUFFIX) {
        Some(idx) => name[..idx].to_string(),
        None => name,
    }
}

/// Body of `GET /api/nodes`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodesResponse {
    // Kept in the order the center sent them
    #[serde(default, deserialize_with = "deserialize_ordered_nodes")]
    pub nodes: Vec<Node>,
}

fn deserialize_ordered_nodes<'de, D>(deserializer: D) -> Result<Vec<Node>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(OrderedNodesVisitor)
}

struct OrderedNodesVisitor;

impl<'de> Visitor<'de> for OrderedNodesVisitor {
    type Value = Vec<Node>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of node name to node info")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut nodes: Vec<Node> = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((name, info)) = access.next_entry::<String, NodeInfo>()? {
            match nodes.iter_mut().find(|node| node.name == name) {
                Some(existing) => existing.info = info,
                None => nodes.push(Node::new(name, info)),
            }
        }
        Ok(nodes)
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Vec::new())
    }

    fn visit_none<E>(self) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_strips_advertised_format() {
        assert_eq!(
            display_name("Speedtest Node on lab-pi._speedtest._tcp.local."),
            "lab-pi"
        );
        assert_eq!(display_name("kitchen._speedtest._tcp.local."), "kitchen");
        assert_eq!(display_name("N1"), "N1");
    }

    #[test]
    fn test_nodes_response_keeps_backend_order() {
        let body = r#"{"nodes": {
            "zeta": {"ip": "10.0.0.9", "port": 8081, "status": "discovered"},
            "alpha": {"ip": "10.0.0.2", "port": 8081, "status": "discovered"},
            "mid": {"ip": "10.0.0.5", "port": 7123, "status": "up"}
        }}"#;
        let response: NodesResponse = serde_json::from_str(body).unwrap();
        let names: Vec<&str> = response.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert_eq!(response.nodes[2].endpoint(), "10.0.0.5:7123");
        assert_eq!(response.nodes[2].info.status, "up");
    }

    #[test]
    fn test_nodes_response_missing_or_null_nodes_is_empty() {
        let missing: NodesResponse = serde_json::from_str("{}").unwrap();
        assert!(missing.nodes.is_empty());

        let null: NodesResponse = serde_json::from_str(r#"{"nodes": null}"#).unwrap();
        assert!(null.nodes.is_empty());
    }

    #[test]
    fn test_nodes_response_duplicate_name_keeps_first_position() {
        let body = r#"{"nodes": {
            "a": {"ip": "10.0.0.1", "port": 1, "status": "x"},
            "b": {"ip": "10.0.0.2", "port": 2, "status": "x"},
            "a": {"ip": "10.0.0.3", "port": 3, "status": "y"}
        }}"#;
        let response: NodesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.nodes.len(), 2);
        assert_eq!(response.nodes[0].name, "a");
        assert_eq!(response.nodes[0].info.ip, "10.0.0.3");
    }

    #[test]
    fn test_node_info_without_status() {
        let info: NodeInfo = serde_json::from_str(r#"{"ip": "10.0.0.1", "port": 8081}"#).unwrap();
        assert_eq!(info.status, "");
    }
}
