//! Common test utilities for workshop-service integration tests.
#![allow(dead_code)]

use rust_decimal::Decimal;
use std::sync::{Arc, Once};
use std::time::Duration;
use uuid::Uuid;
use workshop_service::collaborators::{
    Collaborators, Notification, RecordingNotifier, StaticCatalog, StaticCustomerDirectory,
    StaticIdentityProvider,
};
use workshop_service::config::WorkshopConfig;
use workshop_service::models::{
    Customer, Membership, NewLaborEntry, NewMaterialUsage, NewServiceRequest, ServiceStatus,
};
use workshop_service::services::WorkshopService;
use workshop_service::startup::Application;

pub const ADMIN: &str = "root";
pub const ADVISOR: &str = "ravi";
pub const OTHER_ADVISOR: &str = "meena";
pub const PREMIUM_CUSTOMER: &str = "cust-premium";
pub const STANDARD_CUSTOMER: &str = "cust-standard";

/// 250.00 per unit; four units make 1000.00 of materials.
pub const BRAKE_KIT: &str = "BRAKE-KIT";
pub const ENGINE_OIL: &str = "OIL-5W30";

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,workshop_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub struct TestApp {
    pub app: Application,
    pub identity: Arc<StaticIdentityProvider>,
    pub catalog: Arc<StaticCatalog>,
    pub notifier: Arc<RecordingNotifier>,
    pub premium_vehicle: Uuid,
    pub standard_vehicle: Uuid,
}

/// Test configuration: published rates, fast notification retries.
pub fn test_config() -> WorkshopConfig {
    let mut config = WorkshopConfig::default();
    config.common.service_name = "workshop-service-test".to_string();
    config.notifications.initial_backoff_ms = 1;
    config
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(test_config(), RecordingNotifier::new())
}

pub fn spawn_app_with(config: WorkshopConfig, notifier: RecordingNotifier) -> TestApp {
    init_tracing();

    let premium_vehicle = Uuid::new_v4();
    let standard_vehicle = Uuid::new_v4();

    let identity = Arc::new(
        StaticIdentityProvider::new()
            .with_principal(ADMIN, "ADMIN")
            .with_principal(ADVISOR, "advisor")
            .with_principal(OTHER_ADVISOR, "Service_Advisor")
            .with_principal(PREMIUM_CUSTOMER, "customer")
            .with_principal(STANDARD_CUSTOMER, "ROLE_USER"),
    );
    let catalog = Arc::new(
        StaticCatalog::new()
            .with_item(BRAKE_KIT, Decimal::new(250, 0))
            .with_item(ENGINE_OIL, Decimal::new(45050, 2)),
    );
    let customers = Arc::new(
        StaticCustomerDirectory::new()
            .with_vehicle(
                premium_vehicle,
                Customer {
                    customer_id: PREMIUM_CUSTOMER.into(),
                    name: "Asha".into(),
                    email: "asha@example.com".into(),
                    membership: Membership::Premium,
                },
            )
            .with_vehicle(
                standard_vehicle,
                Customer {
                    customer_id: STANDARD_CUSTOMER.into(),
                    name: "Vikram".into(),
                    email: "vikram@example.com".into(),
                    membership: Membership::Standard,
                },
            ),
    );
    let notifier = Arc::new(notifier);

    let collaborators = Collaborators {
        identity: identity.clone(),
        catalog: catalog.clone(),
        customers,
        notifier: notifier.clone(),
    };

    let app = Application::build(config, collaborators).expect("Failed to build application");

    TestApp {
        app,
        identity,
        catalog,
        notifier,
        premium_vehicle,
        standard_vehicle,
    }
}

impl TestApp {
    pub fn service(&self) -> &WorkshopService {
        self.app.service()
    }

    /// Book a request as admin and assign the default advisor.
    pub async fn open_request(&self, vehicle_id: Uuid) -> Uuid {
        let request = self
            .service()
            .create_request(
                NewServiceRequest {
                    vehicle_id,
                    service_type: "brake_service".into(),
                    description: "Grinding noise when braking".into(),
                    requested_delivery_date: None,
                },
                ADMIN,
            )
            .await
            .expect("Failed to create request");

        self.service()
            .assign(request.request_id, ADVISOR, ADMIN)
            .await
            .expect("Failed to assign advisor");

        request.request_id
    }

    /// Walk the request forward until it reaches `target`.
    pub async fn advance_to(&self, request_id: Uuid, target: ServiceStatus) {
        loop {
            let view = self
                .service()
                .status(request_id, ADMIN)
                .await
                .expect("Failed to read status");
            if view.status >= target {
                return;
            }
            let next = view.status.next().expect("No next status");
            self.service()
                .transition(request_id, next, ADVISOR, "advancing")
                .await
                .expect("Failed to transition");
        }
    }

    /// Book 1000.00 of materials and 500.00 of labor during repair.
    pub async fn book_standard_work(&self, request_id: Uuid) {
        self.advance_to(request_id, ServiceStatus::Repair).await;

        self.service()
            .add_material(request_id, material(BRAKE_KIT, 4), ADVISOR)
            .await
            .expect("Failed to add material");
        self.service()
            .add_labor(request_id, labor("Replace pads and rotors", 2, 250), ADVISOR)
            .await
            .expect("Failed to add labor");
    }

    /// A request with standard work, completed and ready to invoice.
    pub async fn completed_request(&self, vehicle_id: Uuid) -> Uuid {
        let request_id = self.open_request(vehicle_id).await;
        self.book_standard_work(request_id).await;
        self.advance_to(request_id, ServiceStatus::Completed).await;
        request_id
    }

    /// Wait until the notifier has seen `count` deliveries.
    pub async fn wait_for_notifications(&self, count: usize) -> Vec<Notification> {
        for _ in 0..100 {
            let sent = self.notifier.sent().await;
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.notifier.sent().await
    }

    /// Wait until the notifier has been called at least `count` times.
    pub async fn wait_for_attempts(&self, count: u32) -> u32 {
        for _ in 0..100 {
            if self.notifier.attempts() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.notifier.attempts()
    }
}

pub fn material(item_ref: &str, quantity: i64) -> NewMaterialUsage {
    NewMaterialUsage {
        item_ref: item_ref.to_string(),
        quantity: Decimal::new(quantity, 0),
    }
}

pub fn labor(description: &str, hours: i64, rate_per_hour: i64) -> NewLaborEntry {
    NewLaborEntry {
        description: description.to_string(),
        hours: Decimal::new(hours, 0),
        rate_per_hour: Decimal::new(rate_per_hour, 0),
    }
}
