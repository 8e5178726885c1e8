use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_AP_IP: [u8; 4] = [192, 168, 4, 1];
pub const DEFAULT_NETMASK: [u8; 4] = [255, 255, 255, 0];
pub const DEFAULT_DNS_PORT: u16 = 53;
pub const DEFAULT_HTTP_PORT: u16 = 80;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionerConfig {
    pub ap_name: String,
    pub html_title: String,
    pub theme_color: String,
    pub svg_logo: String,
    pub project_title: String,
    pub project_sub_title: String,
    pub project_info: String,
    pub footer_text: String,
    pub connection_successful: String,
    pub reset_confirmation_text: String,
    pub input_text: String,
    pub input_length: u8,
    pub show_input_field: bool,
    pub show_reset_field: bool,
    pub username_text: String,
    pub service_password_text: String,
    pub show_login_fields: bool,
    pub network: PortalNetworkConfig,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            ap_name: "ESP32 Wi-Fi Provisioning".to_string(),
            html_title: "Welcome to Wi-Fi Provision".to_string(),
            theme_color: "dodgerblue".to_string(),
            svg_logo: DEFAULT_LOGO.to_string(),
            project_title: "Wi-Fi Provisioner".to_string(),
            project_sub_title: "Device Setup".to_string(),
            project_info: "Follow the steps to provision your device".to_string(),
            footer_text: "All rights reserved".to_string(),
            connection_successful: "Your device is now provisioned and ready to use."
                .to_string(),
            reset_confirmation_text: "This process cannot be undone.".to_string(),
            input_text: "Device Key".to_string(),
            input_length: 4,
            show_input_field: false,
            show_reset_field: true,
            username_text: "Username".to_string(),
            service_password_text: "Service Password".to_string(),
            show_login_fields: false,
            network: PortalNetworkConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalNetworkConfig {
    pub ap_ip: [u8; 4],
    pub netmask: [u8; 4],
    pub dns_port: u16,
    pub http_port: u16,
    pub wifi_delay_ms: u64,
    pub connect_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub restart_delay_ms: u64,
    pub success_linger_ms: u64,
}

impl Default for PortalNetworkConfig {
    fn default() -> Self {
        Self {
            ap_ip: DEFAULT_AP_IP,
            netmask: DEFAULT_NETMASK,
            dns_port: DEFAULT_DNS_PORT,
            http_port: DEFAULT_HTTP_PORT,
            wifi_delay_ms: 100,
            connect_timeout_ms: 10_000,
            poll_interval_ms: 500,
            restart_delay_ms: 5_000,
            success_linger_ms: 500,
        }
    }
}

impl ProvisionerConfig {
    pub fn sanitize(&mut self) {
        self.input_length = self.input_length.clamp(1, 64);
        if self.ap_name.trim().is_empty() {
            self.ap_name = Self::default().ap_name;
        }
        self.network.sanitize();
    }
}

impl PortalNetworkConfig {
    pub fn ap_ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.ap_ip)
    }

    pub fn netmask(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.netmask)
    }

    pub fn sanitize(&mut self) {
        if self.dns_port == 0 {
            self.dns_port = DEFAULT_DNS_PORT;
        }
        if self.http_port == 0 {
            self.http_port = DEFAULT_HTTP_PORT;
        }

        self.poll_interval_ms = self.poll_interval_ms.clamp(50, 5_000);
        self.connect_timeout_ms = self.connect_timeout_ms.max(self.poll_interval_ms);
    }
}

const DEFAULT_LOGO: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="64" height="64" viewBox="0 0 24 24"><path fill="currentColor" d="M12 21l3.6-4.8A6 6 0 0 0 12 15a6 6 0 0 0-3.6 1.2L12 21zm0-18C7.95 3 4.21 4.34 1.2 6.6L3 9c2.5-1.88 5.62-3 9-3s6.5 1.12 9 3l1.8-2.4C19.79 4.34 16.05 3 12 3zm0 6c-2.7 0-5.19.89-7.2 2.4l1.8 2.4C8.1 12.67 9.97 12 12 12s3.9.67 5.4 1.8l1.8-2.4C17.19 9.89 14.7 9 12 9z"/></svg>"#;
