use std::collections::BTreeMap;

use ephemera_cluster::resources::{
    IpBlock, LabelSelector, NetworkPolicy, NetworkPolicyEgressRule, NetworkPolicyPeer,
    NetworkPolicyPort,
};

const NAMESPACE_NAME_LABEL: &str = "kubernetes.io/metadata.name";
const PRIVATE_RANGES: [&str; 3] = ["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16"];

/// The isolation policies of a hardened namespace. They only make sense
/// together, so they are produced as one fixed set, each name suffixed with
/// `instance`:
///
/// 1. `deny-all` blocks all traffic in both directions;
/// 2. `dns` allows egress to the cluster DNS on port 53;
/// 3. `inter-ns` allows egress to every namespace except this one;
/// 4. `internet` allows egress to public addresses.
pub fn hardening_policies(
    namespace: &str,
    instance: &str,
    labels: &BTreeMap<String, String>,
) -> [NetworkPolicy; 4] {
    let name = |base: &str| format!("{base}-{instance}");
    let deny_all = NetworkPolicy::deny_all(name("deny-all"), namespace, labels.clone());

    let mut dns = NetworkPolicy::new(name("dns"), namespace, labels.clone(), LabelSelector::all());
    dns.add_egress_rule(NetworkPolicyEgressRule {
        to: vec![NetworkPolicyPeer {
            namespace_selector: Some(LabelSelector::label(NAMESPACE_NAME_LABEL, "kube-system")),
            pod_selector: Some(LabelSelector::label("k8s-app", "kube-dns")),
            ip_block: None,
        }],
        ports: vec![
            NetworkPolicyPort {
                protocol: "UDP",
                port: 53,
            },
            NetworkPolicyPort {
                protocol: "TCP",
                port: 53,
            },
        ],
    });

    let mut inter_ns =
        NetworkPolicy::new(name("inter-ns"), namespace, labels.clone(), LabelSelector::all());
    inter_ns.add_egress_rule(NetworkPolicyEgressRule {
        to: vec![NetworkPolicyPeer {
            namespace_selector: Some(LabelSelector::not_in(
                NAMESPACE_NAME_LABEL,
                vec![namespace.to_string()],
            )),
            ..Default::default()
        }],
        ports: Vec::new(),
    });

    let mut internet =
        NetworkPolicy::new(name("internet"), namespace, labels.clone(), LabelSelector::all());
    internet.add_egress_rule(NetworkPolicyEgressRule {
        to: vec![NetworkPolicyPeer {
            ip_block: Some(IpBlock {
                cidr: "0.0.0.0/0".to_string(),
                except: PRIVATE_RANGES.iter().map(|r| r.to_string()).collect(),
            }),
            ..Default::default()
        }],
        ports: Vec::new(),
    });

    [deny_all, dns, inter_ns, internet]
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn four_policies_scoped_to_the_namespace() {
        let policies = hardening_policies("ns1", "a1b2", &BTreeMap::new());
        let names: Vec<_> = policies.iter().map(|p| p.metadata.name.as_str()).collect();
        assert_eq!(
            names,
            ["deny-all-a1b2", "dns-a1b2", "inter-ns-a1b2", "internet-a1b2"]
        );
        for policy in &policies {
            assert_eq!(policy.metadata.namespace.as_deref(), Some("ns1"));
            assert_eq!(policy.spec.pod_selector, LabelSelector::all());
        }
    }

    #[test]
    fn deny_all_has_both_types_and_no_rules() {
        let [deny_all, ..] = hardening_policies("ns1", "a1b2", &BTreeMap::new());
        assert_eq!(deny_all.spec.policy_types, ["Ingress", "Egress"]);
        assert!(deny_all.spec.ingress.is_empty());
        assert!(deny_all.spec.egress.is_empty());
    }

    #[test]
    fn dns_only_reaches_kube_dns_on_port_53() {
        let [_, dns, ..] = hardening_policies("ns1", "a1b2", &BTreeMap::new());
        let value = serde_json::to_value(&dns).unwrap();
        assert_eq!(value["spec"]["policyTypes"], json!(["Egress"]));
        assert_eq!(
            value["spec"]["egress"],
            json!([{
                "to": [{
                    "podSelector": { "matchLabels": { "k8s-app": "kube-dns" } },
                    "namespaceSelector": {
                        "matchLabels": { "kubernetes.io/metadata.name": "kube-system" }
                    },
                }],
                "ports": [
                    { "protocol": "UDP", "port": 53 },
                    { "protocol": "TCP", "port": 53 },
                ],
            }])
        );
    }

    #[test]
    fn inter_namespace_and_internet_rules() {
        let [_, _, inter_ns, internet] = hardening_policies("ns1", "a1b2", &BTreeMap::new());
        let value = serde_json::to_value(&inter_ns).unwrap();
        assert_eq!(
            value["spec"]["egress"][0]["to"][0]["namespaceSelector"]["matchExpressions"],
            json!([{
                "key": "kubernetes.io/metadata.name",
                "operator": "NotIn",
                "values": ["ns1"],
            }])
        );

        let value = serde_json::to_value(&internet).unwrap();
        assert_eq!(
            value["spec"]["egress"][0]["to"][0]["ipBlock"],
            json!({
                "cidr": "0.0.0.0/0",
                "except": ["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16"],
            })
        );
    }
}
