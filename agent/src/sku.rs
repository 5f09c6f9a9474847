//! VM size predicates.

/// Whether the VM size carries an NVIDIA GPU the node should install drivers for. The AMD based
/// NVv4 sizes are excluded.
pub fn is_nvidia_enabled_sku(vm_size: &str) -> bool {
    let size = vm_size.to_lowercase();
    let nvidia_prefix = ["standard_nc", "standard_nd", "standard_nv", "standard_ng"]
        .iter()
        .any(|prefix| size.starts_with(prefix));
    nvidia_prefix && !(size.starts_with("standard_nv") && size.ends_with("_v4"))
}

/// Whether the VM size is an Intel SGX confidential compute size.
pub fn is_sgx_enabled_sku(vm_size: &str) -> bool {
    let size = vm_size.to_lowercase();
    size.starts_with("standard_dc") && !size.contains("as_") && !size.contains("ads_")
}

/// Sizes that support multi-instance GPU partitioning.
const MIG_SKUS: &[&str] = &[
    "standard_nd96asr_v4",
    "standard_nd96amsr_a100_v4",
    "standard_nc24ads_a100_v4",
    "standard_nc48ads_a100_v4",
    "standard_nc96ads_a100_v4",
    "standard_nc40ads_h100_v5",
    "standard_nc80adis_h100_v5",
    "standard_nd96isr_h100_v5",
];

/// Whether a GPU instance profile partitions the GPU of this size.
pub fn is_mig_enabled_node(vm_size: &str, gpu_instance_profile: &str) -> bool {
    !gpu_instance_profile.is_empty() && MIG_SKUS.contains(&vm_size.to_lowercase().as_str())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_is_nvidia_enabled_sku() {
        let test_cases = vec![
            ("Standard_NC6", true),
            ("standard_nd96asr_v4", true),
            ("Standard_NV12s_v3", true),
            ("Standard_NV16as_v4", false),
            ("Standard_DS2_v2", false),
            ("", false),
        ];
        for (size, expected) in test_cases {
            assert_eq!(is_nvidia_enabled_sku(size), expected, "{}", size);
        }
    }

    #[test]
    fn test_is_sgx_enabled_sku() {
        assert!(is_sgx_enabled_sku("Standard_DC2s_v2"));
        assert!(!is_sgx_enabled_sku("Standard_DC2as_v5"));
        assert!(!is_sgx_enabled_sku("Standard_D2s_v3"));
    }

    #[test]
    fn test_is_mig_enabled_node() {
        assert!(is_mig_enabled_node("Standard_ND96asr_v4", "MIG1g"));
        assert!(!is_mig_enabled_node("Standard_ND96asr_v4", ""));
        assert!(!is_mig_enabled_node("Standard_NC6", "MIG1g"));
    }
}
