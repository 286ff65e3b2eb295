pub mod ble_uart_transport;
