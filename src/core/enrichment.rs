//! 补全映射表：地点→公司、公司→驾照州、地点→标签、岗位→分组

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 补全映射表，启动时加载一次，运行期间只读
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnrichmentTables {
    /// 公司 -> 下属地点
    #[serde(default = "default_company_locations")]
    pub company_locations: HashMap<String, Vec<String>>,
    /// 地点 -> Samsara 标签 ID
    #[serde(default = "default_location_tags")]
    pub location_tags: HashMap<String, String>,
    /// 公司（或地点）-> 驾照州
    #[serde(default = "default_license_states")]
    pub license_states: HashMap<String, String>,
    #[serde(default = "default_license_state")]
    pub default_license_state: String,
    /// 分组标签 -> 岗位列表
    #[serde(default = "default_peer_groups")]
    pub peer_groups: HashMap<String, Vec<String>>,
    #[serde(default = "default_peer_group")]
    pub default_peer_group: String,
}

fn default_company_locations() -> HashMap<String, Vec<String>> {
    table_of_lists(&[
        (
            "Matador",
            &[
                "Westpark",
                "Lawrenceville",
                "Cartersville",
                "North Carolina",
                "Conyers",
                "Rossville",
            ],
        ),
        ("Chaparral", &["Austin", "Austin - North"]),
        (
            "Viva",
            &["Amarillo", "Abilene", "Midland", "El Paso", "Lubbock", "San Angelo"],
        ),
    ])
}

fn default_location_tags() -> HashMap<String, String> {
    [
        ("Abilene", "2762144"),
        ("Amarillo", "2762143"),
        ("Austin", "2762148"),
        ("Austin - North", "2762149"),
        ("Byron", "2762160"),
        ("Cartersville", "2762162"),
        ("Conyers", "3516042"),
        ("Lawrenceville", "2762163"),
        ("Lubbock", "2762142"),
        ("Midland", "2568656"),
        ("North Carolina", "2762164"),
        ("Rossville", "2762165"),
        ("San Angelo", "2762145"),
        ("Westpark", "2762161"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_license_states() -> HashMap<String, String> {
    [("Viva", "TX"), ("Chaparral", "TX"), ("North Carolina", "NC")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn default_license_state() -> String {
    "GA".to_string()
}

fn default_peer_groups() -> HashMap<String, Vec<String>> {
    table_of_lists(&[
        (
            "Manager",
            &[
                "District Manager-2016",
                "Market Manager-2016",
                "Operations Level 3 2022",
                "Sales Level 3 2022",
                "Sales Level 4 2022",
                "Warehouse Manager - 2016",
            ],
        ),
        (
            "Driver",
            &["Sales Level 2 2022", "Sales Level 1 2022", "Merchandiser - 2016"],
        ),
        (
            "Warehouse",
            &[
                "Operations Level 1 2022",
                "Operations Level 2 2022",
                "Warehouse Associate - 2016",
            ],
        ),
    ])
}

fn default_peer_group() -> String {
    "Driver".to_string()
}

fn table_of_lists(entries: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
    entries
        .iter()
        .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
        .collect()
}

impl Default for EnrichmentTables {
    fn default() -> Self {
        Self {
            company_locations: default_company_locations(),
            location_tags: default_location_tags(),
            license_states: default_license_states(),
            default_license_state: default_license_state(),
            peer_groups: default_peer_groups(),
            default_peer_group: default_peer_group(),
        }
    }
}

impl EnrichmentTables {
    /// 地点所属公司，找不到返回 None
    pub fn company_for_location(&self, location: &str) -> Option<&str> {
        // HashMap 遍历顺序不固定，按公司名排序保证同一地点总是命中同一家公司
        let mut companies: Vec<_> = self.company_locations.iter().collect();
        companies.sort_by(|a, b| a.0.cmp(b.0));
        companies
            .into_iter()
            .find(|(_, locations)| locations.iter().any(|l| l == location))
            .map(|(company, _)| company.as_str())
    }

    pub fn tag_for_location(&self, location: &str) -> Option<&str> {
        self.location_tags.get(location).map(String::as_str)
    }

    /// 驾照州：地点优先，其次公司，最后默认值
    pub fn license_state(&self, company: &str, location: &str) -> &str {
        self.license_states
            .get(location)
            .or_else(|| self.license_states.get(company))
            .map(String::as_str)
            .unwrap_or(&self.default_license_state)
    }

    /// 岗位对应的分组标签，未知岗位使用默认分组
    pub fn peer_group_for_role(&self, role: Option<&str>) -> &str {
        let Some(role) = role else {
            return &self.default_peer_group;
        };
        let mut groups: Vec<_> = self.peer_groups.iter().collect();
        groups.sort_by(|a, b| a.0.cmp(b.0));
        groups
            .into_iter()
            .find(|(_, roles)| roles.iter().any(|r| r == role))
            .map(|(group, _)| group.as_str())
            .unwrap_or(&self.default_peer_group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_company_for_location() {
        let tables = EnrichmentTables::default();
        assert_eq!(tables.company_for_location("Austin"), Some("Chaparral"));
        assert_eq!(tables.company_for_location("El Paso"), Some("Viva"));
        assert_eq!(tables.company_for_location("Conyers"), Some("Matador"));
        assert_eq!(tables.company_for_location("Mars"), None);
    }

    #[test]
    fn test_license_state_precedence() {
        let tables = EnrichmentTables::default();
        assert_eq!(tables.license_state("Viva", "Lubbock"), "TX");
        assert_eq!(tables.license_state("Matador", "North Carolina"), "NC");
        assert_eq!(tables.license_state("Matador", "Conyers"), "GA");
    }

    #[test]
    fn test_peer_group_for_role() {
        let tables = EnrichmentTables::default();
        assert_eq!(
            tables.peer_group_for_role(Some("Market Manager-2016")),
            "Manager"
        );
        assert_eq!(
            tables.peer_group_for_role(Some("Warehouse Associate - 2016")),
            "Warehouse"
        );
        assert_eq!(tables.peer_group_for_role(Some("Astronaut")), "Driver");
        assert_eq!(tables.peer_group_for_role(None), "Driver");
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let tables: EnrichmentTables =
            serde_json::from_str(r#"{"default_license_state": "TX"}"#).unwrap();
        assert_eq!(tables.default_license_state, "TX");
        assert_eq!(tables.tag_for_location("Austin"), Some("2762148"));
    }
}
