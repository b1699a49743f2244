// src/instruments/relaymux.rs
// 2x4 relay multiplexer with a small SCPI firmware.
use crate::error::LabError;
use crate::instruments::verify_identity;
use crate::port::InstrumentPort;
pub struct RelayMux<P> {
    port: P,
}
fn channel_list(channels: &[u8]) -> Result<String, LabError> {
    if channels.is_empty() {
        return Err(LabError::InvalidParameter("empty relay channel list".into()));
    }
    let list: Vec<String> = channels.iter().map(u8::to_string).collect();
    Ok(format!("(@{})", list.join(",")))
}
impl<P: InstrumentPort> RelayMux<P> {
    pub fn connect(mut port: P) -> Result<Self, LabError> {
        verify_identity(&mut port, "RelayMux")?;
        Ok(Self { port })
    }
    pub fn port(&self) -> &P {
        &self.port
    }
    pub fn close(&mut self, channels: &[u8]) -> Result<(), LabError> {
        let list = channel_list(channels)?;
        self.port.write(&format!("CLOSE {list}"))
    }
    pub fn open(&mut self, channels: &[u8]) -> Result<(), LabError> {
        let list = channel_list(channels)?;
        self.port.write(&format!("OPEN {list}"))
    }
    pub fn open_all(&mut self) -> Result<(), LabError> {
        self.port.write("OPEN:ALL")
    }
    /// All relay states as a bit mask.
    pub fn get(&mut self) -> Result<u32, LabError> {
        let response = self.port.query("ROUTE:GET?")?;
        response
            .trim()
            .parse()
            .map_err(|_| LabError::protocol(self.port.name(), format!("bad relay state {response:?}")))
    }
    pub fn set(&mut self, state: u32) -> Result<(), LabError> {
        self.port.write(&format!("ROUTE:SET {state}"))
    }
}
/// Parse a relay mask given as decimal, `0x` hex or `0b` binary.
pub fn parse_state(text: &str) -> Result<u32, LabError> {
    let text = text.trim();
    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        u32::from_str_radix(bin, 2)
    } else if let Some(oct) = text.strip_prefix("0o").or_else(|| text.strip_prefix("0O")) {
        u32::from_str_radix(oct, 8)
    } else {
        text.parse()
    };
    parsed.map_err(|_| LabError::InvalidParameter(format!("bad relay state {text:?}")))
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::ScriptedPort;
    #[test]
    fn switching_commands() {
        let port = ScriptedPort::scripted("mux")
            .reply("RelayMux v1")
            .reply("37");
        let mut mux = RelayMux::connect(port).unwrap();
        mux.close(&[1, 5]).unwrap();
        mux.open(&[5]).unwrap();
        mux.open_all().unwrap();
        mux.set(0x21).unwrap();
        assert_eq!(mux.get().unwrap(), 37);
        assert!(mux.close(&[]).is_err());
        assert_eq!(
            mux.port().sent()[1..],
            ["CLOSE (@1,5)", "OPEN (@5)", "OPEN:ALL", "ROUTE:SET 33", "ROUTE:GET?"]
        );
    }
    #[test]
    fn state_literals() {
        assert_eq!(parse_state("17").unwrap(), 17);
        assert_eq!(parse_state("0x11").unwrap(), 17);
        assert_eq!(parse_state("0b10001").unwrap(), 17);
        assert_eq!(parse_state("0o21").unwrap(), 17);
        assert!(parse_state("0xZZ").is_err());
    }
}
