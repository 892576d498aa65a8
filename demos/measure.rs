use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};
use vscale::{Gender, Result, ScaleDevice, UserProfile, WeightUnit};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("⚖️  VScale Measurement Example");
    info!("Searching for VScale devices...");

    let profile = UserProfile::new(Gender::Female, 170, 34, 1).with_weight_unit(WeightUnit::Kilograms);

    let mut scale = match ScaleDevice::connect_first(profile).await {
        Ok(device) => {
            info!("✅ Connected to: {}", device.device_info().name);
            device
        }
        Err(e) => {
            error!("❌ Failed to connect to device: {}", e);
            return Err(e);
        }
    };

    info!("Step on the scale, waiting up to 60s for a measurement...");

    match timeout(Duration::from_secs(60), scale.next_measurement()).await {
        Ok(Some(record)) => {
            println!("\n📊 Measurement");
            println!("┌─────────────────────────────────┐");
            println!("│ Weight:   {:8.1} {:2}            │", record.weight, record.weight_unit);
            println!("│ Fat:      {:8.1} %             │", record.fat);
            println!("│ Water:    {:8.1} %             │", record.water);
            println!("│ Bone:     {:8.1} kg            │", record.bone);
            println!("│ Muscle:   {:8.1} %             │", record.muscle);
            println!("│ Visceral: {:8.1} %             │", record.visceral_muscle);
            println!("│ Calorie:  {:8.1}               │", record.calorie);
            println!("│ BMI:      {:8.1}               │", record.bmi);
            println!("└─────────────────────────────────┘");
            println!(
                "  Slot {} / {:?} / age {} / {} cm",
                record.user_slot, record.gender, record.age, record.height_cm
            );
        }
        Ok(None) => warn!("❌ Device disconnected before a measurement arrived"),
        Err(_) => warn!("⏱️  No measurement received"),
    }

    info!("🔌 Disconnecting...");
    if let Err(e) = scale.disconnect().await {
        error!("❌ Failed to disconnect: {}", e);
    } else {
        info!("✅ Disconnected successfully");
    }

    Ok(())
}
