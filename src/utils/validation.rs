//! Placement checks for records.
//!
//! Nothing stops an operator from filing a host under a subnet that does not
//! contain its address; these checks report such mismatches so the store can
//! log them without refusing the write.

use std::net::IpAddr;

use ipnet::IpNet;

use crate::ip::cidr;
use crate::types::Subnet;

/// Check that a host address falls inside its parent subnet
///
/// # Arguments
/// * `address` - The host's parsed address
/// * `parent` - The resolved parent subnet
///
/// # Returns
/// * `Ok(())` if the address lies within the parent's CIDR
/// * `Err(String)` describing the mismatch otherwise
///
/// # Examples
/// ```
/// use p3ipam::utils::validation::validate_host_placement;
/// use p3ipam::types::Subnet;
///
/// let parent = Subnet {
///     id: "LAB001".parse().unwrap(),
///     name: Some("lab".to_string()),
///     cidr: "10.0.0.0/24".to_string(),
///     parent_id: None,
///     comment: String::new(),
///     created_at: chrono::Utc::now(),
/// };
/// assert!(validate_host_placement(&"10.0.0.5".parse().unwrap(), &parent).is_ok());
/// assert!(validate_host_placement(&"10.0.1.5".parse().unwrap(), &parent).is_err());
/// ```
pub fn validate_host_placement(address: &IpAddr, parent: &Subnet) -> Result<(), String> {
    let parent_net = parent_network(parent)?;
    if cidr::contains(&parent_net, address) {
        Ok(())
    } else {
        Err(format!(
            "Host address {} lies outside parent subnet {} ({})",
            address, parent.id, parent.cidr
        ))
    }
}

/// Check that a subnet nests inside its parent subnet
///
/// # Returns
/// * `Ok(())` if `child` is the parent's block or a sub-block of it
/// * `Err(String)` describing the mismatch otherwise
pub fn validate_subnet_nesting(child: &IpNet, parent: &Subnet) -> Result<(), String> {
    let parent_net = parent_network(parent)?;
    if cidr::subnet_of(child, &parent_net) {
        Ok(())
    } else {
        Err(format!(
            "Subnet {} is not contained in parent subnet {} ({})",
            child, parent.id, parent.cidr
        ))
    }
}

fn parent_network(parent: &Subnet) -> Result<IpNet, String> {
    cidr::parse_cidr(&parent.cidr)
        .map_err(|e| format!("Parent subnet {} has an unusable CIDR: {}", parent.id, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn parent(cidr: &str) -> Subnet {
        Subnet {
            id: "PAR100".parse().unwrap(),
            name: None,
            cidr: cidr.to_string(),
            parent_id: None,
            comment: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_host_placement() {
        let p = parent("192.168.1.0/24");
        assert!(validate_host_placement(&"192.168.1.254".parse().unwrap(), &p).is_ok());

        let err = validate_host_placement(&"192.168.2.1".parse().unwrap(), &p).unwrap_err();
        assert!(err.contains("PAR100"));
        assert!(validate_host_placement(&"fe80::1".parse().unwrap(), &p).is_err());
    }

    #[test]
    fn test_subnet_nesting() {
        let p = parent("10.0.0.0/16");
        assert!(validate_subnet_nesting(&"10.0.3.0/24".parse().unwrap(), &p).is_ok());
        assert!(validate_subnet_nesting(&"10.0.0.0/16".parse().unwrap(), &p).is_ok());
        assert!(validate_subnet_nesting(&"10.0.0.0/8".parse().unwrap(), &p).is_err());
    }

    #[test]
    fn test_corrupt_parent_cidr_is_reported() {
        let p = parent("not-a-cidr");
        let err = validate_host_placement(&"10.0.0.1".parse().unwrap(), &p).unwrap_err();
        assert!(err.contains("unusable CIDR"));
    }
}
