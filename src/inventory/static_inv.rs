// Static INI-style inventory parser
//
//   [group]
//   host1
//   host2

use std::path::Path;

use super::{HostGroup, Inventory};
use crate::output::errors::FleetError;

/// Parse inventory from a hosts file
pub fn parse_inventory_file(path: &Path) -> Result<Inventory, FleetError> {
    if !path.exists() {
        return Err(FleetError::Io {
            message: format!("Hosts file not found: {}", path.display()),
            path: Some(path.to_path_buf()),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|e| FleetError::Io {
        message: format!("Failed to read hosts file: {}", e),
        path: Some(path.to_path_buf()),
    })?;

    parse_inventory(&content)
}

/// Parse inventory from a string.
///
/// Blank lines and `#` comments are skipped. A `[name]` header starts a
/// group; declaring the same group again starts it over. Any host line
/// before the first header is an error.
pub fn parse_inventory(content: &str) -> Result<Inventory, FleetError> {
    let mut inventory = Inventory::new();
    let mut current: Option<HostGroup> = None;

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            if let Some(group) = current.take() {
                inventory.add_group(group);
            }
            current = Some(HostGroup::new(&line[1..line.len() - 1]));
            continue;
        }

        match current.as_mut() {
            Some(group) => group.hosts.push(line.to_string()),
            None => {
                return Err(FleetError::Inventory {
                    message: format!(
                        "Host '{}' found before any group definition at line {}",
                        line,
                        index + 1
                    ),
                    suggestion: Some("Add a [group] header above the first host".to_string()),
                })
            }
        }
    }

    if let Some(group) = current.take() {
        inventory.add_group(group);
    }

    Ok(inventory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_groups() {
        let text = r#"
# production web tier
[web]
web1.example.com
web2.example.com

[db]
  db1.example.com
# trailing comment
"#;

        let inv = parse_inventory(text).unwrap();
        assert_eq!(inv.len(), 2);
        assert_eq!(
            inv.get_group("web").unwrap().hosts,
            vec!["web1.example.com", "web2.example.com"]
        );
        assert_eq!(inv.get_group("db").unwrap().hosts, vec!["db1.example.com"]);
    }

    #[test]
    fn test_empty_group_is_kept() {
        let inv = parse_inventory("[web]\nh1\n[staging]\n").unwrap();
        assert!(inv.get_group("staging").unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_hosts_preserved() {
        let inv = parse_inventory("[web]\nh1\nh2\nh1\n").unwrap();
        assert_eq!(inv.get_group("web").unwrap().hosts, vec!["h1", "h2", "h1"]);
    }

    #[test]
    fn test_redeclared_group_starts_over() {
        let inv = parse_inventory("[web]\nold\n[db]\ndb1\n[web]\nnew\n").unwrap();
        assert_eq!(inv.get_group("web").unwrap().hosts, vec!["new"]);
        let names: Vec<_> = inv.groups().map(|g| g.name.clone()).collect();
        assert_eq!(names, vec!["web", "db"]);
    }

    #[test]
    fn test_host_before_group_is_error() {
        let err = parse_inventory("# header\n\norphan\n[web]\nh1\n").unwrap_err();
        match err {
            FleetError::Inventory { message, .. } => {
                assert_eq!(
                    message,
                    "Host 'orphan' found before any group definition at line 3"
                );
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_parse_inventory_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts");
        std::fs::write(&path, "[web]\nh1\nh2\n").unwrap();

        let inv = parse_inventory_file(&path).unwrap();
        assert_eq!(inv.get_group("web").unwrap().hosts.len(), 2);

        let missing = parse_inventory_file(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(missing, FleetError::Io { .. }));
    }
}
