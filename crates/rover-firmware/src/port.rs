//! The controller's end of the serial link.

use rover_types::RoverError;

/// Non-blocking byte input and line output.
///
/// `read_byte` must return immediately; an empty receive buffer is `None`,
/// not a wait. Write failures are reported so the loop can log them, but the
/// loop keeps running either way.
pub trait SerialPort: Send {
    fn read_byte(&mut self) -> Option<u8>;

    /// Write one complete line, including its `\n`.
    fn write_line(&mut self, line: &str) -> Result<(), RoverError>;
}
