use std::io::{self, Write};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use gpd_panel_lib::serial::transport::{self, PortInfo};
use gpd_panel_lib::session::{Session, CHANNEL_COUNT};

// Console front panel standing in for the GUI: pick a port, connect, watch
// telemetry, program setpoints, toggle the output.
fn main() -> Result<()> {
    env_logger::init();

    println!("==============================");
    println!("  GPD-X303S Control Panel");
    println!("==============================");

    let mut session = Session::new();

    loop {
        println!();
        println!("Select action:");
        println!("  1. Connect to instrument");
        println!("  2. Watch telemetry (5 s)");
        println!("  3. Set channel voltage");
        println!("  4. Set channel current");
        println!("  5. Toggle output");
        println!("  6. Exit");

        match prompt("> ")?.as_str() {
            "1" => connect(&mut session)?,
            "2" => watch_telemetry(&session),
            "3" => set_value(&mut session, true)?,
            "4" => set_value(&mut session, false)?,
            "5" => toggle_output(&mut session),
            "6" => break,
            _ => eprintln!("[ERROR] Invalid choice. Please enter 1-6."),
        }
    }

    session.disconnect();
    Ok(())
}

fn connect(session: &mut Session) -> Result<()> {
    let ports = transport::list_ports().context("could not enumerate serial ports")?;
    if ports.is_empty() {
        eprintln!("[ERROR] No serial ports found.");
        return Ok(());
    }

    println!("Available serial ports:");
    for (i, port) in ports.iter().enumerate() {
        println!("  {}: {}", i, describe(port));
    }

    let choice = prompt("Select a port (number): ")?;
    let Some(port) = choice.parse::<usize>().ok().and_then(|i| ports.get(i)) else {
        eprintln!("[ERROR] Invalid port selection.");
        return Ok(());
    };

    match session.connect(&port.port_name) {
        Ok(identity) => {
            println!("Connected: {}", identity);
            println!(
                "Output is {}",
                if session.output_state().is_on() { "ON" } else { "OFF" }
            );
        }
        Err(e) => eprintln!("[ERROR] Connection failed: {}", e),
    }
    Ok(())
}

fn watch_telemetry(session: &Session) {
    if !session.is_connected() {
        eprintln!("[ERROR] Not connected.");
        return;
    }
    if !session.is_polling() {
        println!("Output is off; telemetry polling is idle. Last readings:");
        print_readings(session);
        return;
    }

    println!("Watching telemetry, Ctrl+C to abort early...");
    let updates = session.subscribe();
    let deadline = Instant::now() + Duration::from_secs(5);

    while Instant::now() < deadline {
        match updates.recv_timeout(Duration::from_millis(250)) {
            Ok(event) => println!("  {:?}", event),
            Err(_) => continue,
        }
    }
    print_readings(session);
}

fn print_readings(session: &Session) {
    for (i, reading) in session.readings().iter().enumerate() {
        println!(
            "  CH{}: {} V  {} A",
            i + 1,
            or_dash(&reading.voltage),
            or_dash(&reading.current)
        );
    }
}

fn set_value(session: &mut Session, voltage: bool) -> Result<()> {
    let channel = prompt(&format!("Channel (1-{}): ", CHANNEL_COUNT))?;
    let Ok(channel) = channel.parse::<u8>() else {
        eprintln!("[ERROR] Invalid channel.");
        return Ok(());
    };
    if channel < 1 || channel as usize > CHANNEL_COUNT {
        eprintln!("[ERROR] Invalid channel.");
        return Ok(());
    }

    let value = prompt(if voltage { "Voltage: " } else { "Current: " })?;
    let result = if voltage {
        session.set_voltage(channel, &value)
    } else {
        session.set_current(channel, &value)
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
    }
    Ok(())
}

fn toggle_output(session: &mut Session) {
    let turn_on = !session.output_state().is_on();
    match session.toggle_output(turn_on) {
        Ok(()) => println!("Output {}", if turn_on { "ON" } else { "OFF" }),
        Err(e) => eprintln!("[ERROR] {}", e),
    }
}

fn describe(port: &PortInfo) -> String {
    match (&port.manufacturer, &port.product) {
        (_, Some(product)) => format!("{} ({})", port.port_name, product),
        (Some(manufacturer), None) => format!("{} ({})", port.port_name, manufacturer),
        _ => port.port_name.clone(),
    }
}

fn or_dash(text: &str) -> &str {
    if text.is_empty() {
        "-"
    } else {
        text
    }
}

fn prompt(message: &str) -> Result<String> {
    print!("{}", message);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}
