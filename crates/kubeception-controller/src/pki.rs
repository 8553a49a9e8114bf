//! PKI reconciler
//!
//! Converges the certificate hierarchy of one control plane as cert-manager
//! requests, in a fixed order:
//!
//! 1. a self-signed root issuer named after the Pki
//! 2. the CA certificate, signed by the root issuer
//! 3. a CA issuer backed by the CA secret, which signs every leaf
//! 4. the admin client certificate
//! 5. the admin kubeconfig, once the admin secret and the control plane
//!    address both exist
//! 6. the leaf certificates of every component
//!
//! The API server certificate needs the control plane address in its SANs,
//! so no leaf below step 5 is requested before the address is known.

use std::net::IpAddr;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use k8s_openapi::ByteString;
use tracing::debug;

use kubeception_common::converge::{converge, owner_reference};
use kubeception_common::crd::{
    ApiServerCertificate, Certificate, CertificateSpec, CertificateSubject, Issuer, IssuerRef,
    IssuerSpec, Pki, PkiSpec, PrivateKeySpec, SecretRef,
};
use kubeception_common::kubeconfig::{https_url, synthesize, TlsMaterial};
use kubeception_common::readiness::{require, Readiness};
use kubeception_common::resource::ResourceKind;
use kubeception_common::store::{get_typed, ObjectStore};
use kubeception_common::{
    kubeconfig_secret_name, ready, Error, ObjectKey, Outcome, API_SERVER_PORT, KUBECONFIG_KEY,
};

use crate::context::Context;

/// Reconcile the Pki at `key`
///
/// The admin kubeconfig targets the control plane address, so it waits for
/// the address as well as the admin secret and is written after both gates.
pub async fn reconcile(ctx: &Context, key: &ObjectKey) -> Result<Outcome, Error> {
    let store = ctx.store();
    let delay = ctx.config.not_ready_requeue;
    let Some(pki) = get_typed::<Pki>(store, key).await? else {
        return Ok(Outcome::Done);
    };
    let spec = &pki.spec;
    spec.validate(&key.name)?;
    let owner = owner_reference(&pki)?;

    converge_issuer(store, key, &owner, &spec.name, IssuerSpec::self_signed()).await?;
    converge_certificate(store, key, &owner, ca_certificate(spec)).await?;
    converge_issuer(
        store,
        key,
        &owner,
        spec.ca.name.as_str(),
        IssuerSpec::ca(spec.ca.name.as_str()),
    )
    .await?;
    converge_certificate(store, key, &owner, admin_certificate(spec)).await?;

    let admin: Secret = ready!(
        require(store, &spec.admin.name.key(&key.namespace)).await?,
        delay
    );
    let address = ready!(
        Readiness::from_option(spec.address(), "control plane address", key),
        delay
    );

    let admin_kubeconfig = synthesize(
        &TlsMaterial::from_secret(&admin)?,
        &https_url(address, API_SERVER_PORT),
    )?;
    converge_kubeconfig(
        store,
        &key.sibling(
            ResourceKind::Secret,
            kubeconfig_secret_name(spec.admin.name.as_str()),
        ),
        &owner,
        admin_kubeconfig,
    )
    .await?;

    for leaf in leaf_certificates(spec, address) {
        converge_certificate(store, key, &owner, leaf).await?;
    }

    debug!(name = %key.name, namespace = %key.namespace, "certificate hierarchy converged");
    Ok(Outcome::Done)
}

async fn converge_issuer(
    store: &dyn ObjectStore,
    pki: &ObjectKey,
    owner: &OwnerReference,
    name: &str,
    spec: IssuerSpec,
) -> Result<(), Error> {
    let key = pki.sibling(ResourceKind::Issuer, name);
    converge(store, &key, owner, |mut issuer: Issuer| {
        issuer.spec = spec;
        Ok(issuer)
    })
    .await?;
    Ok(())
}

async fn converge_certificate(
    store: &dyn ObjectStore,
    pki: &ObjectKey,
    owner: &OwnerReference,
    spec: CertificateSpec,
) -> Result<(), Error> {
    let key = pki.sibling(ResourceKind::Certificate, spec.secret_name.clone());
    converge(store, &key, owner, |mut certificate: Certificate| {
        certificate.spec = spec;
        Ok(certificate)
    })
    .await?;
    Ok(())
}

/// Converge a secret holding a single kubeconfig document.
///
/// The document lands in `data`, never `stringData`, so the stored form is
/// what the next comparison sees.
pub(crate) async fn converge_kubeconfig(
    store: &dyn ObjectStore,
    key: &ObjectKey,
    owner: &OwnerReference,
    document: String,
) -> Result<(), Error> {
    converge(store, key, owner, |mut secret: Secret| {
        secret.data = Some(
            [(KUBECONFIG_KEY.to_string(), ByteString(document.into_bytes()))]
                .into_iter()
                .collect(),
        );
        Ok(secret)
    })
    .await?;
    Ok(())
}

fn leaf(
    secret: &SecretRef,
    issuer: &SecretRef,
    common_name: &str,
    organization: Option<&str>,
) -> CertificateSpec {
    CertificateSpec {
        is_ca: false,
        common_name: Some(common_name.to_string()),
        subject: organization.map(|o| CertificateSubject {
            organizations: vec![o.to_string()],
        }),
        dns_names: Vec::new(),
        ip_addresses: Vec::new(),
        secret_name: secret.as_str().to_string(),
        private_key: Some(PrivateKeySpec::default()),
        issuer_ref: IssuerRef::issuer(issuer.as_str()),
    }
}

/// CA certificate, signed by the self-signed root issuer
pub fn ca_certificate(spec: &PkiSpec) -> CertificateSpec {
    CertificateSpec {
        is_ca: true,
        common_name: Some("ca".to_string()),
        subject: None,
        dns_names: vec!["localhost".to_string()],
        ip_addresses: Vec::new(),
        secret_name: spec.ca.name.as_str().to_string(),
        private_key: Some(PrivateKeySpec::default()),
        issuer_ref: IssuerRef::issuer(&spec.name),
    }
}

/// Cluster administrator client certificate
pub fn admin_certificate(spec: &PkiSpec) -> CertificateSpec {
    leaf(
        &spec.admin.name,
        &spec.ca.name,
        "cluster-admin",
        Some("system:masters"),
    )
}

/// API server serving certificate with the control plane address in its SANs
pub fn kube_apiserver_certificate(spec: &PkiSpec, address: &str) -> CertificateSpec {
    let (ip_addresses, dns_names) = apiserver_sans(&spec.kube_apiserver, address);
    CertificateSpec {
        ip_addresses,
        dns_names,
        ..leaf(
            &spec.kube_apiserver.name,
            &spec.ca.name,
            "kube-apiserver",
            Some("kubernetes"),
        )
    }
}

/// Subject alternative names of the API server certificate.
///
/// The address is appended to the DNS names, and to the IP addresses when it
/// parses as one. Duplicates are dropped, keeping the first occurrence.
pub fn apiserver_sans(
    certificate: &ApiServerCertificate,
    address: &str,
) -> (Vec<String>, Vec<String>) {
    let mut ip_addresses = certificate.ip_addresses.clone();
    let mut dns_names = certificate.dns_names.clone();
    if address.parse::<IpAddr>().is_ok() {
        ip_addresses.push(address.to_string());
    }
    dns_names.push(address.to_string());
    (dedup(ip_addresses), dedup(dns_names))
}

fn dedup(values: Vec<String>) -> Vec<String> {
    let mut seen = Vec::with_capacity(values.len());
    for value in values {
        if !seen.contains(&value) {
            seen.push(value);
        }
    }
    seen
}

/// Every leaf certificate gated on the control plane address, in request order
pub fn leaf_certificates(spec: &PkiSpec, address: &str) -> Vec<CertificateSpec> {
    vec![
        kube_apiserver_certificate(spec, address),
        leaf(
            &spec.service_accounts.name,
            &spec.ca.name,
            "kubernetes",
            Some("Kubernetes"),
        ),
        leaf(
            &spec.kube_controller_manager.name,
            &spec.ca.name,
            "system:kube-controller-manager",
            Some("system:kube-controller-manager"),
        ),
        leaf(
            &spec.kube_scheduler.name,
            &spec.ca.name,
            "system:kube-scheduler",
            Some("system:kube-scheduler"),
        ),
        leaf(
            &spec.konnectivity.name,
            &spec.ca.name,
            "system:konnectivity-server",
            None,
        ),
    ]
}
